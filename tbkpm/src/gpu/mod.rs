// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu device with FP64 compute for the Chebyshev recursion.
//!
//! ## Adapter selection
//!
//! Set `TBKPM_GPU_ADAPTER` to select a specific GPU:
//!
//! | Value | Behavior |
//! |-------|----------|
//! | `auto` | first discrete adapter with `SHADER_F64`, then any with it |
//! | `0`, `1`, … | adapter by enumeration index |
//! | substring | case-insensitive name match (e.g. `"titan"`, `"4070"`) |
//! | *(unset)* | same as `auto` |
//!
//! `TBKPM_WGPU_BACKEND` (`vulkan`, `metal`, `dx12`, `gl`) restricts the wgpu backend.

mod adapter;
mod buffers;
mod dispatch;

pub use adapter::Selector;
pub use buffers::mapped_bytes_to_f64;
pub use dispatch::{row_grid, Recording};

use std::sync::Arc;

use crate::error::{Result, TbError};

/// GPU context with FP64 support.
#[must_use]
pub struct GpuF64 {
    pub adapter_name: String,
    pub has_f64: bool,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl std::fmt::Debug for GpuF64 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuF64")
            .field("adapter_name", &self.adapter_name)
            .field("has_f64", &self.has_f64)
            .finish_non_exhaustive()
    }
}

impl GpuF64 {
    #[must_use]
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    #[must_use]
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Create a device on the selected adapter, requesting `SHADER_F64` when offered.
    ///
    /// # Errors
    ///
    /// [`TbError::NoAdapter`] if no adapter matches, [`TbError::DeviceCreation`]
    /// if wgpu refuses the device.
    pub async fn new() -> Result<Self> {
        let selected = adapter::select()?;
        let info = selected.get_info();

        let mut required_features = wgpu::Features::empty();
        if selected.features().contains(wgpu::Features::SHADER_F64) {
            required_features |= wgpu::Features::SHADER_F64;
        }
        let adapter_limits = selected.limits();
        let required_limits = wgpu::Limits {
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_buffer_size: adapter_limits.max_buffer_size,
            ..wgpu::Limits::default()
        };

        let (device, queue) = selected
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("tbkpm device"),
                    required_features,
                    required_limits,
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await
            .map_err(|e| TbError::DeviceCreation(e.to_string()))?;

        Ok(Self {
            adapter_name: info.name,
            has_f64: required_features.contains(wgpu::Features::SHADER_F64),
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    /// [`Self::new`] driven to completion on a current-thread tokio runtime.
    ///
    /// # Errors
    ///
    /// As [`Self::new`]; [`TbError::DeviceCreation`] if the runtime cannot start.
    pub fn new_blocking() -> Result<Self> {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| TbError::DeviceCreation(format!("tokio runtime: {e}")))?
            .block_on(Self::new())
    }

    /// Print device capabilities.
    pub fn print_info(&self) {
        println!("  GPU: {}", self.adapter_name);
        println!("  SHADER_F64: {}", if self.has_f64 { "YES" } else { "NO" });
    }

    /// Print all available adapters to stdout.
    pub fn print_available_adapters() {
        let adapters = adapter::list();
        println!("  Available GPU adapters:");
        for (index, name, has_f64) in &adapters {
            let marker = if *has_f64 { "✓ f64" } else { "✗ f32" };
            println!("    [{index}] {name} ({marker})");
        }
        if adapters.is_empty() {
            println!("    (none found)");
        }
    }

    /// Compile a WGSL compute shader with entry point `main`.
    #[must_use]
    pub fn create_pipeline(&self, wgsl: &str, label: &str) -> wgpu::ComputePipeline {
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(label),
                source: wgpu::ShaderSource::Wgsl(wgsl.into()),
            });
        self.device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some(label),
                layout: None,
                module: &module,
                entry_point: "main",
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                cache: None,
            })
    }
}
