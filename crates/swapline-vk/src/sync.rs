// SPDX-License-Identifier: CEPL-1.0
//! Frame pacing: the ring of in-flight slots and the per-image gates.
//!
//! Two independent gates keep host and device from stepping on each other:
//!
//! - each [`FrameSlot`] owns a `frame_done` fence, so the host never has more
//!   than `K` frames submitted at once;
//! - each swapchain image remembers the fence of the last frame that rendered
//!   into it, because the driver may hand images back in any order and an
//!   image can come round again while an older slot still writes to it.
//!
//! Collapsing the two reintroduces a write-after-write hazard on the image.

use ash::vk;
use tracing::{debug, trace};

use crate::error::{PresentError, PresentResult, VkResultExt};
use crate::gpu::SharedGpu;

/// Device-side ordering primitive; destroyed on drop.
pub struct Semaphore {
    gpu: SharedGpu,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(gpu: &SharedGpu) -> PresentResult<Self> {
        let semaphore = gpu.create_semaphore().during("create_semaphore")?;
        Ok(Self {
            gpu: gpu.clone(),
            semaphore,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.gpu.destroy_semaphore(self.semaphore);
    }
}

/// Host-waitable gate; destroyed on drop.
pub struct Fence {
    gpu: SharedGpu,
    fence: vk::Fence,
}

impl Fence {
    pub fn new(gpu: &SharedGpu, signaled: bool) -> PresentResult<Self> {
        let fence = gpu.create_fence(signaled).during("create_fence")?;
        Ok(Self {
            gpu: gpu.clone(),
            fence,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    pub fn wait(&self, timeout_ns: u64) -> PresentResult<()> {
        self.gpu
            .wait_for_fence(self.fence, timeout_ns)
            .during("wait_for_fences")
    }

    pub fn reset(&self) -> PresentResult<()> {
        self.gpu.reset_fence(self.fence).during("reset_fences")
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.gpu.destroy_fence(self.fence);
    }
}

/// One in-flight frame's worth of synchronization.
pub struct FrameSlot {
    pub image_acquired: Semaphore,
    pub render_complete: Semaphore,
    /// Created signaled so the very first wait returns immediately.
    pub frame_done: Fence,
}

impl FrameSlot {
    fn new(gpu: &SharedGpu) -> PresentResult<Self> {
        Ok(Self {
            image_acquired: Semaphore::new(gpu)?,
            render_complete: Semaphore::new(gpu)?,
            frame_done: Fence::new(gpu, true)?,
        })
    }
}

/// Fixed ring of `K` slots plus one gate entry per swapchain image.
///
/// Slots are created once and live until shutdown; only the image gates are
/// reset when the swapchain is rebuilt.
pub struct FrameSynchronizer {
    image_gates: Vec<Option<vk::Fence>>,
    slots: Vec<FrameSlot>,
    current: usize,
    timeout_ns: u64,
}

impl FrameSynchronizer {
    pub fn new(
        gpu: &SharedGpu,
        frames_in_flight: usize,
        image_count: usize,
        timeout_ns: u64,
    ) -> PresentResult<Self> {
        if frames_in_flight == 0 {
            return Err(PresentError::InvalidConfig(
                "frames_in_flight must be at least 1".into(),
            ));
        }
        let slots = (0..frames_in_flight)
            .map(|_| FrameSlot::new(gpu))
            .collect::<PresentResult<Vec<_>>>()?;
        debug!("created {} frame slots", slots.len());
        Ok(Self {
            image_gates: vec![None; image_count],
            slots,
            current: 0,
            timeout_ns,
        })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.current]
    }

    /// Blocks until the current slot's previous submission has finished.
    pub fn wait_current(&self) -> PresentResult<()> {
        trace!(slot = self.current, "wait frame_done");
        self.current().frame_done.wait(self.timeout_ns)
    }

    /// Makes `image_index` safe to render into for the current slot: waits
    /// for whichever frame last used it, then hands the image to this slot.
    pub fn claim_image(&mut self, image_index: usize) -> PresentResult<()> {
        let current_fence = self.current().frame_done.handle();
        let gate = *self.image_gates.get(image_index).ok_or_else(|| {
            PresentError::InvalidConfig(format!("image index {image_index} out of range"))
        })?;
        if let Some(owner) = gate {
            if owner != current_fence {
                trace!(image_index, "image still in flight, waiting");
            }
            self.slots
                .iter()
                .find(|s| s.frame_done.handle() == owner)
                .map_or(Ok(()), |s| s.frame_done.wait(self.timeout_ns))?;
        }
        self.image_gates[image_index] = Some(current_fence);
        Ok(())
    }

    /// Re-arms the current slot's fence right before its submission.
    pub fn reset_current(&self) -> PresentResult<()> {
        self.current().frame_done.reset()
    }

    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.slots.len();
    }

    /// Forgets every image owner; called after the swapchain is rebuilt.
    /// The current slot index is left untouched.
    pub fn reset_image_gates(&mut self, image_count: usize) {
        self.image_gates.clear();
        self.image_gates.resize(image_count, None);
    }

    pub fn image_gate(&self, image_index: usize) -> Option<vk::Fence> {
        self.image_gates.get(image_index).copied().flatten()
    }
}
