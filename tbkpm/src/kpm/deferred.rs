// SPDX-License-Identifier: AGPL-3.0-only

//! Lazily evaluated KPM results.
//!
//! A [`Deferred`] holds a shared handle to its [`Kpm`] object (and through
//! it the model), so the computation can be submitted now and run later,
//! possibly in parallel with many others. Nothing is allocated until
//! [`Deferred::compute`] or [`Deferred::compute_all`] runs it; the result
//! is computed once and cached, errors included.

use std::sync::{Arc, OnceLock};

use rayon::prelude::*;

use super::Kpm;
use crate::error::Result;

type Job<T> = dyn Fn(&Kpm) -> Result<T> + Send + Sync;

pub struct Deferred<T> {
    kpm: Arc<Kpm>,
    job: Box<Job<T>>,
    result: OnceLock<Result<T>>,
}

impl<T> std::fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deferred")
            .field("computed", &self.result.get().is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + Send + Sync> Deferred<T> {
    pub fn new(kpm: Arc<Kpm>, job: impl Fn(&Kpm) -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            kpm,
            job: Box::new(job),
            result: OnceLock::new(),
        }
    }

    /// Run the computation on first call; later calls return the cached result.
    ///
    /// # Errors
    ///
    /// Whatever the underlying computation returned.
    pub fn compute(&self) -> Result<T> {
        self.result.get_or_init(|| (self.job)(&self.kpm)).clone()
    }

    #[must_use]
    pub fn is_computed(&self) -> bool {
        self.result.get().is_some()
    }

    /// Evaluate every pending handle in parallel.
    pub fn compute_all(deferred: &[Self]) {
        deferred.par_iter().for_each(|d| {
            let _ = d.compute();
        });
    }

    /// The KPM object this handle keeps alive.
    #[must_use]
    pub const fn kpm(&self) -> &Arc<Kpm> {
        &self.kpm
    }
}
