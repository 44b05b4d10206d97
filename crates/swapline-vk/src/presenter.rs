// SPDX-License-Identifier: CEPL-1.0
//! The per-frame driver: wait, acquire, claim, submit, present, advance.
//!
//! Device statuses are interpreted here and nowhere else. Out-of-date,
//! suboptimal and a pending window resize route to [`Presenter::rebuild`];
//! everything else that is not success ends the loop.

use ash::vk;
use bitflags::bitflags;
use swapline_render::{PresentConfig, PresentWindow, RenderSize};
use tracing::{debug, info, trace, warn};

use crate::error::{PresentError, PresentResult, VkResultExt};
use crate::gpu::{SharedGpu, Submission};
use crate::recorder::{CommandSet, DrawWork};
use crate::swapchain::{RetiredSwapchain, Swapchain, SwapchainConfig};
use crate::sync::FrameSynchronizer;
use crate::targets::RenderTargets;

bitflags! {
    /// Why the swapchain was rebuilt. Several can apply to one frame.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct RebuildReason: u8 {
        const OUT_OF_DATE = 1 << 0;
        const SUBOPTIMAL  = 1 << 1;
        const RESIZED     = 1 << 2;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The swapchain was rebuilt; the frame slot did not advance.
    Rebuilt(RebuildReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresentStats {
    pub frames: u64,
    pub rebuilds: u64,
}

/// Everything that depends on the swapchain's format or extent.
/// Field order is drop order: commands, targets, then the swapchain.
struct SwapchainResources {
    commands: CommandSet,
    targets: RenderTargets,
    swapchain: Swapchain,
}

impl SwapchainResources {
    fn build(
        gpu: &SharedGpu,
        size: RenderSize,
        config: &PresentConfig,
        draw: &mut dyn DrawWork,
        old: vk::SwapchainKHR,
    ) -> PresentResult<Self> {
        let swapchain = Swapchain::build(gpu, size, config.present_mode, old)?;
        let targets = RenderTargets::build(gpu, &swapchain)?;
        let commands = CommandSet::record(gpu, &swapchain, &targets, config.clear_color, draw)?;
        Ok(Self {
            commands,
            targets,
            swapchain,
        })
    }

    /// Releases everything but the swapchain handle, which the next build
    /// receives as its predecessor.
    fn retire(self) -> RetiredSwapchain {
        let Self {
            commands,
            targets,
            swapchain,
        } = self;
        drop(commands);
        drop(targets);
        swapchain.retire()
    }
}

/// Blocks in `wait_events` while the framebuffer is zero-sized (minimized).
/// `None` if the window asks to close while minimized.
fn wait_for_drawable(window: &mut dyn PresentWindow) -> Option<RenderSize> {
    let mut size = window.framebuffer_size();
    if size.is_empty() {
        debug!("framebuffer is empty, waiting for the window to come back");
    }
    while size.is_empty() {
        if window.should_close() {
            return None;
        }
        window.wait_events();
        size = window.framebuffer_size();
    }
    Some(size)
}

/// Owns the swapchain and everything derived from it, plus the frame ring.
///
/// Field order is drop order. `Drop` drains the device first.
pub struct Presenter {
    resources: Option<SwapchainResources>,
    sync: FrameSynchronizer,
    draw: Box<dyn DrawWork>,
    config: PresentConfig,
    stats: PresentStats,
    gpu: SharedGpu,
}

impl Presenter {
    pub fn new(
        gpu: SharedGpu,
        window: &mut dyn PresentWindow,
        config: PresentConfig,
        mut draw: Box<dyn DrawWork>,
    ) -> PresentResult<Self> {
        if config.frames_in_flight == 0 {
            return Err(PresentError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        let size = wait_for_drawable(window).ok_or(PresentError::WindowClosed)?;
        let resources = SwapchainResources::build(
            &gpu,
            size,
            &config,
            draw.as_mut(),
            vk::SwapchainKHR::null(),
        )?;
        let sync = FrameSynchronizer::new(
            &gpu,
            config.frames_in_flight,
            resources.swapchain.image_count(),
            config.wait_timeout_ns(),
        )?;
        window.take_resized();
        info!(
            frames_in_flight = config.frames_in_flight,
            images = resources.swapchain.image_count(),
            "presenter ready"
        );
        Ok(Self {
            resources: Some(resources),
            sync,
            draw,
            config,
            stats: PresentStats::default(),
            gpu,
        })
    }

    pub fn stats(&self) -> PresentStats {
        self.stats
    }

    pub fn config(&self) -> &PresentConfig {
        &self.config
    }

    /// Index of the frame slot the next `draw_frame` will use.
    pub fn current_slot(&self) -> usize {
        self.sync.current_index()
    }

    pub fn swapchain_config(&self) -> Option<SwapchainConfig> {
        self.resources.as_ref().map(|r| *r.swapchain.config())
    }

    #[cfg(test)]
    pub(crate) fn sync(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn image_count(&self) -> usize {
        self.resources
            .as_ref()
            .map_or(0, |r| r.swapchain.image_count())
    }

    /// Runs until the window asks to close or a fatal error occurs. The
    /// device is drained before returning either way.
    pub fn run(&mut self, window: &mut dyn PresentWindow) -> PresentResult<()> {
        let result = loop {
            if window.should_close() {
                break Ok(());
            }
            window.poll_events();
            if let Err(err) = self.draw_frame(window) {
                break Err(err);
            }
        };
        let drained = self.gpu.device_wait_idle().during("device_wait_idle");
        info!(
            frames = self.stats.frames,
            rebuilds = self.stats.rebuilds,
            "presentation loop finished"
        );
        result.and(drained)
    }

    /// One iteration of the loop. Never advances the slot after a rebuild.
    pub fn draw_frame(&mut self, window: &mut dyn PresentWindow) -> PresentResult<FrameOutcome> {
        let swapchain = self
            .resources
            .as_ref()
            .map(|r| r.swapchain.handle())
            .ok_or(PresentError::NoSwapchain)?;

        self.sync.wait_current()?;
        let slot = self.sync.current();
        let image_acquired = slot.image_acquired.handle();
        let render_complete = slot.render_complete.handle();
        let frame_done = slot.frame_done.handle();

        let acquired = self.gpu.acquire_next_image(
            swapchain,
            self.config.wait_timeout_ns(),
            image_acquired,
        );
        let image_index = match acquired {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!(index, "acquired a suboptimal image");
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                self.rebuild(window, RebuildReason::OUT_OF_DATE)?;
                return Ok(FrameOutcome::Rebuilt(RebuildReason::OUT_OF_DATE));
            }
            Err(err) => return Err(PresentError::from_vk("acquire_next_image", err)),
        };
        let image = image_index as usize;

        self.sync.claim_image(image)?;
        let command_buffer = self
            .resources
            .as_ref()
            .and_then(|r| r.commands.get(image))
            .ok_or(PresentError::NoSwapchain)?;

        self.sync.reset_current()?;
        self.gpu
            .queue_submit(&Submission {
                command_buffer,
                wait: image_acquired,
                wait_stage: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                signal: render_complete,
                fence: frame_done,
            })
            .during("queue_submit")?;

        let mut reason = RebuildReason::empty();
        match self
            .gpu
            .queue_present(swapchain, image_index, render_complete)
        {
            Ok(suboptimal) => {
                self.stats.frames += 1;
                if suboptimal {
                    reason |= RebuildReason::SUBOPTIMAL;
                }
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => reason |= RebuildReason::OUT_OF_DATE,
            Err(err) => return Err(PresentError::from_vk("queue_present", err)),
        }
        if window.take_resized() {
            reason |= RebuildReason::RESIZED;
        }
        trace!(slot = self.sync.current_index(), image, "frame submitted");

        if !reason.is_empty() {
            self.rebuild(window, reason)?;
            return Ok(FrameOutcome::Rebuilt(reason));
        }
        self.sync.advance();
        Ok(FrameOutcome::Presented)
    }

    /// Tears down and rebuilds the swapchain and everything derived from it.
    ///
    /// Blocks while the window is minimized, then drains the device. A close
    /// request during that wait skips the rebuild and keeps the old state. The
    /// old swapchain is handed to the driver and destroyed once its
    /// successor exists. Image gates are cleared; the frame slot is kept.
    pub fn rebuild(
        &mut self,
        window: &mut dyn PresentWindow,
        reason: RebuildReason,
    ) -> PresentResult<()> {
        info!("rebuilding swapchain: {reason:?}");
        let Some(size) = wait_for_drawable(window) else {
            debug!("window closed while minimized, rebuild skipped");
            return Ok(());
        };
        window.take_resized();
        self.gpu.device_wait_idle().during("device_wait_idle")?;

        let retired = self.resources.take().map(SwapchainResources::retire);
        let old = retired
            .as_ref()
            .map_or(vk::SwapchainKHR::null(), RetiredSwapchain::handle);
        let built = SwapchainResources::build(
            &self.gpu,
            size,
            &self.config,
            self.draw.as_mut(),
            old,
        );
        drop(retired);
        let resources = built?;

        self.sync
            .reset_image_gates(resources.swapchain.image_count());
        self.resources = Some(resources);
        self.stats.rebuilds += 1;
        Ok(())
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        if let Err(err) = self.gpu.device_wait_idle() {
            warn!("device_wait_idle on shutdown failed: {err}");
        }
    }
}
