// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::{PresentResult, VkResultExt};
use crate::gpu::{GpuDevice, SharedGpu};
use crate::swapchain::Swapchain;
use crate::targets::RenderTargets;

/// Draw commands recorded inside the render pass. Opaque to the engine.
pub trait DrawWork {
    fn record(
        &mut self,
        gpu: &dyn GpuDevice,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
    );
}

impl<F> DrawWork for F
where
    F: FnMut(&dyn GpuDevice, vk::CommandBuffer, vk::Pipeline, vk::Extent2D),
{
    fn record(
        &mut self,
        gpu: &dyn GpuDevice,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        extent: vk::Extent2D,
    ) {
        self(gpu, cmd, pipeline, extent)
    }
}

/// The built-in triangle: positions live in the vertex shader.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriangleDraw;

impl DrawWork for TriangleDraw {
    fn record(
        &mut self,
        gpu: &dyn GpuDevice,
        cmd: vk::CommandBuffer,
        pipeline: vk::Pipeline,
        _extent: vk::Extent2D,
    ) {
        gpu.cmd_bind_pipeline(cmd, pipeline);
        gpu.cmd_draw(cmd, 3, 1);
    }
}

/// One primary command buffer per swapchain image, freed on drop.
pub struct CommandSet {
    gpu: SharedGpu,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandSet {
    /// Allocates and records a buffer for every image of `swapchain`.
    /// Recording always starts from scratch; buffers are never patched.
    pub fn record(
        gpu: &SharedGpu,
        swapchain: &Swapchain,
        targets: &RenderTargets,
        clear: [f32; 4],
        draw: &mut dyn DrawWork,
    ) -> PresentResult<Self> {
        let count = u32::try_from(swapchain.image_count()).unwrap_or(u32::MAX);
        let buffers = gpu
            .allocate_command_buffers(count)
            .during("allocate_command_buffers")?;
        let set = Self {
            gpu: gpu.clone(),
            buffers,
        };

        let extent = swapchain.extent();
        for (&cmd, &framebuffer) in set.buffers.iter().zip(targets.framebuffers()) {
            gpu.begin_command_buffer(cmd)
                .during("begin_command_buffer")?;
            gpu.cmd_begin_render_pass(cmd, targets.render_pass(), framebuffer, extent, clear);
            draw.record(gpu.as_ref(), cmd, targets.pipeline(), extent);
            gpu.cmd_end_render_pass(cmd);
            gpu.end_command_buffer(cmd).during("end_command_buffer")?;
        }
        debug!(
            "recorded {} command buffers at {}x{}",
            set.buffers.len(),
            extent.width,
            extent.height
        );
        Ok(set)
    }

    pub fn get(&self, image_index: usize) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index).copied()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Drop for CommandSet {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            self.gpu.free_command_buffers(&self.buffers);
        }
    }
}
