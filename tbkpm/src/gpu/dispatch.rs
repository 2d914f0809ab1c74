// SPDX-License-Identifier: AGPL-3.0-only

//! One command buffer per KPM recursion.
//!
//! A [`Recording`] collects the step and collect passes of every moment,
//! then the final copy of the moment table into a staging buffer, and
//! submits them as a single queue submission.

use super::GpuF64;

/// Largest workgroup count per dispatch dimension.
const MAX_GROUPS_PER_DIM: u32 = 65_535;

/// Workgroup grid covering `rows` rows at `workgroup_size` threads each.
///
/// Rows beyond one dimension spill into `y`; shaders recover the row as
/// `gid.x + gid.y * num_workgroups.x * workgroup_size`.
#[must_use]
pub fn row_grid(rows: u32, workgroup_size: u32) -> (u32, u32) {
    let groups = rows.div_ceil(workgroup_size).max(1);
    if groups <= MAX_GROUPS_PER_DIM {
        (groups, 1)
    } else {
        let y = groups.div_ceil(MAX_GROUPS_PER_DIM);
        (groups.div_ceil(y), y)
    }
}

/// Passes of one recursion, not yet submitted.
pub struct Recording<'a> {
    gpu: &'a GpuF64,
    encoder: wgpu::CommandEncoder,
    passes: usize,
}

impl GpuF64 {
    /// Start recording a recursion.
    #[must_use]
    pub fn record(&self, label: &str) -> Recording<'_> {
        let encoder = self
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) });
        Recording {
            gpu: self,
            encoder,
            passes: 0,
        }
    }
}

impl Recording<'_> {
    /// Dispatch `pipeline` with `buffers[i]` bound at binding `i`, over a
    /// `grid` of workgroups.
    pub fn pass(
        &mut self,
        pipeline: &wgpu::ComputePipeline,
        buffers: &[&wgpu::Buffer],
        grid: (u32, u32),
    ) {
        let entries: Vec<wgpu::BindGroupEntry> = buffers
            .iter()
            .enumerate()
            .map(|(i, buf)| wgpu::BindGroupEntry {
                binding: i as u32,
                resource: buf.as_entire_binding(),
            })
            .collect();
        let bind_group = self.gpu.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: None,
            layout: &pipeline.get_bind_group_layout(0),
            entries: &entries,
        });

        let mut pass = self
            .encoder
            .begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: None,
                timestamp_writes: None,
            });
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.dispatch_workgroups(grid.0, grid.1, 1);
        self.passes += 1;
    }

    /// Copy the first `bytes` of `source` into `staging`, after the passes so far.
    pub fn copy(&mut self, source: &wgpu::Buffer, staging: &wgpu::Buffer, bytes: u64) {
        self.encoder
            .copy_buffer_to_buffer(source, 0, staging, 0, bytes);
    }

    /// Submit everything recorded; returns the number of compute passes.
    pub fn submit(self) -> usize {
        self.gpu.queue().submit(std::iter::once(self.encoder.finish()));
        self.passes
    }
}
