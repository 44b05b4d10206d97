// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{PresentResult, VkResultExt};
use crate::gpu::SharedGpu;
use crate::swapchain::Swapchain;

/// Render pass, pipeline and one framebuffer per swapchain view. All three
/// depend on the swapchain format or extent and are rebuilt with it.
///
/// Teardown order: framebuffers, pipeline (+ layout), render pass.
pub struct RenderTargets {
    gpu: SharedGpu,
    render_pass: vk::RenderPass,
    layout: vk::PipelineLayout,
    pipeline: vk::Pipeline,
    framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTargets {
    pub fn build(gpu: &SharedGpu, swapchain: &Swapchain) -> PresentResult<Self> {
        let render_pass = gpu
            .create_render_pass(swapchain.format())
            .during("create_render_pass")?;
        let mut targets = Self {
            gpu: gpu.clone(),
            render_pass,
            layout: vk::PipelineLayout::null(),
            pipeline: vk::Pipeline::null(),
            framebuffers: Vec::with_capacity(swapchain.image_count()),
        };

        let (layout, pipeline) = gpu
            .create_pipeline(render_pass, swapchain.extent())
            .during("create_graphics_pipelines")?;
        targets.layout = layout;
        targets.pipeline = pipeline;

        for &view in swapchain.views() {
            let fb = gpu
                .create_framebuffer(render_pass, view, swapchain.extent())
                .during("create_framebuffer")?;
            targets.framebuffers.push(fb);
        }
        Ok(targets)
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    pub fn pipeline(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }
}

impl Drop for RenderTargets {
    fn drop(&mut self) {
        for fb in self.framebuffers.drain(..) {
            self.gpu.destroy_framebuffer(fb);
        }
        if self.pipeline != vk::Pipeline::null() {
            self.gpu.destroy_pipeline(self.layout, self.pipeline);
        }
        self.gpu.destroy_render_pass(self.render_pass);
    }
}
