// SPDX-License-Identifier: AGPL-3.0-only

//! wgpu f64 backend for the Chebyshev recursion.
//!
//! The whole recursion is encoded into one command buffer: for every step a
//! CSR pass computes `y = f·H̃x − y` over the leading `size` rows, then a
//! single-thread pass copies the target entries into a moment table. The
//! two recursion vectors stay device-resident and swap roles each step;
//! only the moment table is read back. `T₀` entries are known on the host.

use num_complex::Complex64;
use tracing::debug;

use super::ComputeBackend;
use crate::error::{Result, TbError};
use crate::gpu::{row_grid, GpuF64};
use crate::kpm::moments::{DiagonalMoments, OffDiagonalMoments};
use crate::kpm::optimized::{OptimizedHamiltonian, OptimizedVariant};
use crate::scalar::ScalarTag;

/// Per-step uniform shared by both shaders.
#[repr(C)]
#[derive(Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct StepParams {
    size: u32,
    double_step: u32,
    moment: u32,
    ncols: u32,
}

/// `y[i] = f·Σⱼ H̃ᵢⱼ x[j] − y[i]` for `i < size`, with `f = 2` when `double_step`.
///
/// | Binding | Type | Content |
/// |---------|------|---------|
/// | 0 | uniform | `StepParams` |
/// | 1 | storage, read | `row_ptr: array<u32>` |
/// | 2 | storage, read | `col_idx: array<u32>` |
/// | 3 | storage, read | `vals: array<f64>` |
/// | 4 | storage, read | `x_vec: array<f64>` |
/// | 5 | storage, read_write | `y_vec: array<f64>` |
pub const WGSL_CHEBYSHEV_STEP_F64: &str = r"
struct Params {
    size: u32,
    double_step: u32,
    moment: u32,
    ncols: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> row_ptr: array<u32>;
@group(0) @binding(2) var<storage, read> col_idx: array<u32>;
@group(0) @binding(3) var<storage, read> vals: array<f64>;
@group(0) @binding(4) var<storage, read> x_vec: array<f64>;
@group(0) @binding(5) var<storage, read_write> y_vec: array<f64>;

@compute @workgroup_size(64)
fn main(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) nwg: vec3<u32>,
) {
    let row = gid.x + gid.y * nwg.x * 64u;
    if row >= params.size {
        return;
    }

    var sum: f64 = f64(0.0);
    for (var j = row_ptr[row]; j < row_ptr[row + 1u]; j = j + 1u) {
        sum = sum + vals[j] * x_vec[col_idx[j]];
    }

    var factor: f64 = f64(1.0);
    if params.double_step != 0u {
        factor = f64(2.0);
    }
    y_vec[row] = factor * sum - y_vec[row];
}
";

/// `moments[moment·ncols + c] = t_vec[cols[c]]`, one thread.
pub const WGSL_COLLECT_MOMENT_F64: &str = r"
struct Params {
    size: u32,
    double_step: u32,
    moment: u32,
    ncols: u32,
}

@group(0) @binding(0) var<uniform> params: Params;
@group(0) @binding(1) var<storage, read> cols: array<u32>;
@group(0) @binding(2) var<storage, read> t_vec: array<f64>;
@group(0) @binding(3) var<storage, read_write> moments: array<f64>;

@compute @workgroup_size(1)
fn main() {
    for (var c = 0u; c < params.ncols; c = c + 1u) {
        moments[params.moment * params.ncols + c] = t_vec[cols[c]];
    }
}
";

const WORKGROUP_SIZE: u32 = 64;

pub struct GpuBackend {
    gpu: GpuF64,
    step: wgpu::ComputePipeline,
    collect: wgpu::ComputePipeline,
}

impl std::fmt::Debug for GpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuBackend")
            .field("gpu", &self.gpu)
            .finish_non_exhaustive()
    }
}

impl GpuBackend {
    /// Open the selected adapter and compile both shaders.
    ///
    /// # Errors
    ///
    /// Device creation failures, or [`TbError::NoShaderF64`].
    pub fn new() -> Result<Self> {
        Self::from_device(GpuF64::new_blocking()?)
    }

    /// Use an already created device.
    ///
    /// # Errors
    ///
    /// [`TbError::NoShaderF64`] if the device has no f64 shader support.
    pub fn from_device(gpu: GpuF64) -> Result<Self> {
        if !gpu.has_f64 {
            return Err(TbError::NoShaderF64);
        }
        let step = gpu.create_pipeline(WGSL_CHEBYSHEV_STEP_F64, "chebyshev_step");
        let collect = gpu.create_pipeline(WGSL_COLLECT_MOMENT_F64, "collect_moment");
        debug!(adapter = %gpu.adapter_name, "GPU KPM backend ready");
        Ok(Self { gpu, step, collect })
    }

    #[must_use]
    pub fn adapter_name(&self) -> &str {
        &self.gpu.adapter_name
    }

    fn run(&self, oh: &OptimizedHamiltonian<f64>, num_moments: usize) -> Result<OffDiagonalMoments> {
        let gpu = &self.gpu;
        let m = oh.matrix();
        let indices = oh.indices();
        let n = m.rows;
        let ncols = indices.cols.len();

        let mut moments = vec![vec![Complex64::new(0.0, 0.0); num_moments]; ncols];
        if num_moments == 0 {
            return Ok(OffDiagonalMoments {
                moments,
                operations: 0,
            });
        }
        for (k, &c) in indices.cols.iter().enumerate() {
            if c == indices.row {
                moments[k][0] = Complex64::new(1.0, 0.0);
            }
        }
        if num_moments == 1 {
            return Ok(OffDiagonalMoments {
                moments,
                operations: 0,
            });
        }

        let to_u32 = |v: &[usize]| -> Result<Vec<u32>> {
            v.iter()
                .map(|&x| {
                    u32::try_from(x).map_err(|_| {
                        TbError::config(format!("index {x} exceeds the GPU u32 range"))
                    })
                })
                .collect()
        };
        // zero-length storage bindings are invalid
        let non_empty = |mut v: Vec<u32>| {
            if v.is_empty() {
                v.push(0);
            }
            v
        };
        let mut values = m.values.clone();
        if values.is_empty() {
            values.push(0.0);
        }

        let row_ptr_buf = gpu.create_u32_buffer(&to_u32(&m.row_ptr)?, "kpm_row_ptr");
        let col_idx_buf = gpu.create_u32_buffer(&non_empty(to_u32(&m.col_idx)?), "kpm_col_idx");
        let values_buf = gpu.create_f64_buffer(&values, "kpm_values");
        let cols_buf = gpu.create_u32_buffer(&to_u32(&indices.cols)?, "kpm_cols");

        let mut start = vec![0.0; n];
        start[indices.row] = 1.0;
        let vec_a = gpu.create_f64_buffer(&start, "kpm_t_a");
        let vec_b = gpu.create_f64_output_buffer(n, "kpm_t_b");
        let table_len = num_moments * ncols;
        let table = gpu.create_f64_output_buffer(table_len, "kpm_moments");
        let staging = gpu.create_staging_buffer(table_len * 8, "kpm_moments_staging");

        let mut recording = gpu.record("kpm_recursion");
        let mut operations = 0;
        // previous = Tₙ₋₁ (overwritten in place by Tₙ₊₁), current = Tₙ
        let (mut previous, mut current) = (&vec_b, &vec_a);
        for step in 0..num_moments - 1 {
            let size = oh.size_for_step(step);
            let params = StepParams {
                size: u32::try_from(size)
                    .map_err(|_| TbError::config("system exceeds the GPU u32 range"))?,
                double_step: u32::from(step > 0),
                moment: (step + 1) as u32,
                ncols: ncols as u32,
            };
            let params_buf = gpu.create_uniform_buffer(bytemuck::bytes_of(&params), "kpm_step");
            recording.pass(
                &self.step,
                &[
                    &params_buf,
                    &row_ptr_buf,
                    &col_idx_buf,
                    &values_buf,
                    current,
                    previous,
                ],
                row_grid(params.size, WORKGROUP_SIZE),
            );
            std::mem::swap(&mut previous, &mut current);
            recording.pass(&self.collect, &[&params_buf, &cols_buf, current, &table], (1, 1));
            operations += oh.step_operations(size);
        }
        recording.copy(&table, &staging, (table_len * 8) as u64);
        let passes = recording.submit();
        debug!(passes, moments = num_moments, "GPU recursion submitted");

        let raw = gpu.read_staging_f64(&staging)?;
        for step in 1..num_moments {
            for (k, column) in moments.iter_mut().enumerate() {
                column[step] = Complex64::new(raw[step * ncols + k], 0.0);
            }
        }
        Ok(OffDiagonalMoments {
            moments,
            operations,
        })
    }
}

impl ComputeBackend for GpuBackend {
    fn name(&self) -> &str {
        "gpu"
    }

    fn supports(&self, tag: ScalarTag) -> bool {
        tag == ScalarTag::F64
    }

    fn diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<DiagonalMoments> {
        let OffDiagonalMoments {
            moments,
            operations,
        } = self.off_diagonal_moments(oh, num_moments)?;
        Ok(DiagonalMoments {
            moments: moments
                .into_iter()
                .next()
                .unwrap_or_default()
                .into_iter()
                .map(|mu| mu.re)
                .collect(),
            operations,
        })
    }

    fn off_diagonal_moments(
        &self,
        oh: &OptimizedVariant,
        num_moments: usize,
    ) -> Result<OffDiagonalMoments> {
        self.run(oh.get::<f64>()?, num_moments)
    }
}
