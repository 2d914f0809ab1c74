// SPDX-License-Identifier: AGPL-3.0-only

//! Cost accounting of the last moment computation.

use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TbError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub num_moments: usize,
    /// Multiply-add operations of the recursion (nnz touched + rows touched per step).
    pub num_operations: u64,
    /// Bytes of the optimized matrix.
    pub matrix_memory: usize,
    /// Bytes of the recursion vectors.
    pub vector_memory: usize,
    /// Wall-clock time of the recursion.
    pub elapsed: f64,
    /// Backend that ran the recursion.
    pub backend: String,
}

impl Stats {
    /// Operations per second; 0 when no time was measured.
    #[must_use]
    pub fn ops(&self) -> f64 {
        if self.elapsed > 0.0 {
            self.num_operations as f64 / self.elapsed
        } else {
            0.0
        }
    }

    #[must_use]
    pub const fn elapsed_seconds(&self) -> f64 {
        self.elapsed
    }

    /// Fold the stats of an independent computation into a batch total.
    pub fn merge(&mut self, other: &Self) {
        self.num_moments = self.num_moments.max(other.num_moments);
        self.num_operations += other.num_operations;
        self.matrix_memory = self.matrix_memory.max(other.matrix_memory);
        self.vector_memory += other.vector_memory;
        self.elapsed += other.elapsed;
        if self.backend.is_empty() {
            self.backend.clone_from(&other.backend);
        }
    }

    /// JSON form for the validation summaries.
    ///
    /// # Errors
    ///
    /// [`TbError::Configuration`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| TbError::config(format!("stats serialization: {e}")))
    }

    /// One-line or multi-line human-readable summary.
    #[must_use]
    pub fn report(&self, shortform: bool) -> String {
        let mut s = String::new();
        if shortform {
            let _ = write!(
                s,
                "{} moments, {:.2e} ops/s, {:.3}s",
                self.num_moments,
                self.ops(),
                self.elapsed
            );
        } else {
            let _ = writeln!(s, "KPM moments: {} ({})", self.num_moments, self.backend);
            let _ = writeln!(s, "  operations: {}", self.num_operations);
            let _ = writeln!(
                s,
                "  memory: {} matrix + {} vectors",
                human_bytes(self.matrix_memory),
                human_bytes(self.vector_memory)
            );
            let _ = write!(s, "  time: {:.3}s ({:.2e} ops/s)", self.elapsed, self.ops());
        }
        s
    }
}

fn human_bytes(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Stats {
        Stats {
            num_moments: 100,
            num_operations: 2_000,
            matrix_memory: 4096,
            vector_memory: 512,
            elapsed: 0.5,
            backend: "host".into(),
        }
    }

    #[test]
    fn ops_per_second() {
        assert!((sample().ops() - 4000.0).abs() < 1e-9);
        assert_eq!(Stats::default().ops(), 0.0);
    }

    #[test]
    fn merge_accumulates_work() {
        let mut total = Stats::default();
        total.merge(&sample());
        total.merge(&sample());
        assert_eq!(total.num_operations, 4_000);
        assert_eq!(total.num_moments, 100);
        assert_eq!(total.backend, "host");
        assert!((total.elapsed_seconds() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn json_round_trip_keeps_fields() {
        let json = sample().to_json().unwrap();
        assert!(json.contains("\"num_moments\": 100"));
        let back: Stats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sample());
    }

    #[test]
    fn report_forms() {
        assert!(sample().report(true).starts_with("100 moments"));
        let long = sample().report(false);
        assert!(long.contains("4.0 KiB matrix"));
        assert!(long.contains("512 B vectors"));
    }
}
