// SPDX-License-Identifier: AGPL-3.0-only

//! Which adapter runs the recursion.
//!
//! The KPM shaders need `SHADER_F64`, so automatic selection only looks at
//! adapters that offer it. An explicit `TBKPM_GPU_ADAPTER` choice is honored
//! as given; a device without f64 is then rejected when the backend is built.

use crate::error::{Result, TbError};

/// Adapter choice parsed from `TBKPM_GPU_ADAPTER`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// First discrete adapter with f64, else any adapter with f64.
    Auto,
    Index(usize),
    /// Case-insensitive substring of the adapter name.
    Name(String),
}

impl Selector {
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        if value.is_empty() || value == "auto" {
            Self::Auto
        } else if let Ok(index) = value.parse() {
            Self::Index(index)
        } else {
            Self::Name(value)
        }
    }

    #[must_use]
    pub fn from_env() -> Self {
        Self::parse(&std::env::var("TBKPM_GPU_ADAPTER").unwrap_or_default())
    }

    /// Position of the chosen adapter among `(name, is_discrete, has_f64)`.
    fn position(&self, adapters: &[(String, bool, bool)]) -> Option<usize> {
        match self {
            Self::Auto => adapters
                .iter()
                .position(|&(_, discrete, has_f64)| discrete && has_f64)
                .or_else(|| adapters.iter().position(|&(_, _, has_f64)| has_f64)),
            Self::Index(i) => (*i < adapters.len()).then_some(*i),
            Self::Name(name) => adapters
                .iter()
                .position(|(n, _, _)| n.to_lowercase().contains(name.as_str())),
        }
    }
}

/// Backends allowed by `TBKPM_WGPU_BACKEND`.
#[must_use]
pub fn backends(value: Option<&str>) -> wgpu::Backends {
    match value.map(str::trim) {
        Some("vulkan") => wgpu::Backends::VULKAN,
        Some("metal") => wgpu::Backends::METAL,
        Some("dx12") => wgpu::Backends::DX12,
        Some("gl") => wgpu::Backends::GL,
        _ => wgpu::Backends::all(),
    }
}

fn adapters() -> Vec<wgpu::Adapter> {
    let backends = backends(std::env::var("TBKPM_WGPU_BACKEND").ok().as_deref());
    wgpu::Instance::new(wgpu::InstanceDescriptor {
        backends,
        ..Default::default()
    })
    .enumerate_adapters(backends)
}

fn summary(adapter: &wgpu::Adapter) -> (String, bool, bool) {
    let info = adapter.get_info();
    (
        info.name,
        info.device_type == wgpu::DeviceType::DiscreteGpu,
        adapter.features().contains(wgpu::Features::SHADER_F64),
    )
}

/// One line per visible adapter: `(index, name, has_f64)`.
#[must_use]
pub fn list() -> Vec<(usize, String, bool)> {
    adapters()
        .iter()
        .map(summary)
        .enumerate()
        .map(|(i, (name, _, has_f64))| (i, name, has_f64))
        .collect()
}

/// The adapter [`Selector::from_env`] points at.
///
/// # Errors
///
/// [`TbError::NoAdapter`] if no adapter is visible or none matches.
pub fn select() -> Result<wgpu::Adapter> {
    let selector = Selector::from_env();
    let mut found = adapters();
    let summaries: Vec<_> = found.iter().map(summary).collect();
    let index = selector.position(&summaries).ok_or(TbError::NoAdapter)?;
    Ok(found.swap_remove(index))
}
