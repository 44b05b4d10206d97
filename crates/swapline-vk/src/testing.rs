// SPDX-License-Identifier: CEPL-1.0
//! Scripted stand-ins for the device and the window.
//!
//! [`FakeGpu`] hands out real `ash` handle values, tracks which ones are
//! alive, and models fences closely enough to catch ordering bugs: a fence
//! submitted twice, a wait on a fence nothing will ever signal, or an image
//! rendered into while its previous frame is still pending.

use ash::prelude::VkResult;
use ash::vk::{self, Handle};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use swapline_render::{PresentWindow, RenderSize};

use crate::gpu::{GpuDevice, QueueFamilyPair, Submission, SwapchainRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Kind {
    Swapchain,
    ImageView,
    RenderPass,
    PipelineLayout,
    Pipeline,
    Framebuffer,
    CommandBuffer,
    Semaphore,
    Fence,
}

#[derive(Clone, Debug)]
pub struct SwapchainBuild {
    pub handle: vk::SwapchainKHR,
    pub old: vk::SwapchainKHR,
    pub sharing_mode: vk::SharingMode,
    pub families: Vec<u32>,
    pub extent: (u32, u32),
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FenceState {
    pub signaled: bool,
    pub pending: bool,
}

pub struct FakeState {
    pub caps: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
    pub families: QueueFamilyPair,
    pub surface_error: Option<vk::Result>,
    pub surface_queries: usize,

    pub swapchain_builds: Vec<SwapchainBuild>,
    /// Images handed out on top of what the request asked for.
    pub extra_images: u32,
    pub fail_image_view_at: Option<usize>,
    pub pipeline_error: Option<vk::Result>,
    pub pipeline_extents: Vec<(u32, u32)>,
    pub fail_fence_at: Option<usize>,

    /// Pending fences never complete on a finite wait.
    pub stall: bool,
    /// Results injected by call index; `SUBOPTIMAL_KHR` means success with
    /// the suboptimal flag set.
    pub acquire_results: HashMap<usize, vk::Result>,
    pub present_results: HashMap<usize, vk::Result>,
    pub submit_error: Option<vk::Result>,

    pub acquires: usize,
    pub presents: usize,
    pub acquire_semaphores: Vec<vk::Semaphore>,
    pub acquired_images: Vec<u32>,
    pub submissions: Vec<Submission>,
    pub presented: Vec<(vk::SwapchainKHR, u32)>,
    pub wait_idle_calls: usize,
    pub max_pending: usize,
    /// Submissions that wrote to an image whose previous frame was pending.
    pub image_hazards: usize,

    live: HashMap<Kind, HashSet<u64>>,
    fences: HashMap<vk::Fence, FenceState>,
    images: HashMap<vk::SwapchainKHR, Vec<vk::Image>>,
    next_image: HashMap<vk::SwapchainKHR, usize>,
    image_owner: HashMap<vk::Image, vk::Fence>,
    last_acquired: Option<vk::Image>,
    commands: HashMap<vk::CommandBuffer, Vec<String>>,
    ops: Vec<String>,
    next_handle: u64,
    views_created: usize,
    fences_created: usize,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            caps: vk::SurfaceCapabilitiesKHR {
                min_image_count: 2,
                max_image_count: 8,
                current_extent: vk::Extent2D {
                    width: u32::MAX,
                    height: u32::MAX,
                },
                min_image_extent: vk::Extent2D {
                    width: 1,
                    height: 1,
                },
                max_image_extent: vk::Extent2D {
                    width: 4096,
                    height: 4096,
                },
                current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
                ..Default::default()
            },
            formats: vec![
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_UNORM,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
                vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                },
            ],
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
            families: QueueFamilyPair {
                graphics: 0,
                present: 0,
            },
            surface_error: None,
            surface_queries: 0,
            swapchain_builds: Vec::new(),
            extra_images: 0,
            fail_image_view_at: None,
            pipeline_error: None,
            pipeline_extents: Vec::new(),
            fail_fence_at: None,
            stall: false,
            acquire_results: HashMap::new(),
            present_results: HashMap::new(),
            submit_error: None,
            acquires: 0,
            presents: 0,
            acquire_semaphores: Vec::new(),
            acquired_images: Vec::new(),
            submissions: Vec::new(),
            presented: Vec::new(),
            wait_idle_calls: 0,
            max_pending: 0,
            image_hazards: 0,
            live: HashMap::new(),
            fences: HashMap::new(),
            images: HashMap::new(),
            next_image: HashMap::new(),
            image_owner: HashMap::new(),
            last_acquired: None,
            commands: HashMap::new(),
            ops: Vec::new(),
            next_handle: 1,
            views_created: 0,
            fences_created: 0,
        }
    }
}

impl FakeState {
    fn raw(&mut self) -> u64 {
        let raw = self.next_handle;
        self.next_handle += 1;
        raw
    }

    fn track(&mut self, kind: Kind, raw: u64) {
        self.live.entry(kind).or_default().insert(raw);
    }

    fn release(&mut self, kind: Kind, raw: u64) {
        let removed = self.live.get_mut(&kind).is_some_and(|set| set.remove(&raw));
        assert!(removed, "{kind:?} {raw:#x} destroyed twice or never created");
    }

    fn is_live(&self, kind: Kind, raw: u64) -> bool {
        self.live.get(&kind).is_some_and(|set| set.contains(&raw))
    }

    fn pending_count(&self) -> usize {
        self.fences.values().filter(|f| f.pending).count()
    }

    fn log(&mut self, op: String) {
        self.ops.push(op);
    }

    fn record(&mut self, cmd: vk::CommandBuffer, entry: String) {
        self.commands.entry(cmd).or_default().push(entry);
    }
}

#[derive(Default)]
pub struct FakeGpu {
    state: Mutex<FakeState>,
}

impl FakeGpu {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut FakeState) -> R) -> R {
        f(&mut self.state())
    }

    pub fn live(&self, kind: Kind) -> usize {
        self.state().live.get(&kind).map_or(0, HashSet::len)
    }

    pub fn ops(&self) -> Vec<String> {
        self.state().ops.clone()
    }

    pub fn commands_for(&self, cmd: vk::CommandBuffer) -> Vec<String> {
        self.state().commands.get(&cmd).cloned().unwrap_or_default()
    }

    pub fn fence_signaled(&self, fence: vk::Fence) -> bool {
        self.state().fences.get(&fence).is_some_and(|f| f.signaled)
    }

    /// Pretends the device is still working on `fence`.
    pub fn mark_pending(&self, fence: vk::Fence) {
        let mut s = self.state();
        let f = s.fences.get_mut(&fence).expect("unknown fence");
        f.signaled = false;
        f.pending = true;
    }
}

impl GpuDevice for FakeGpu {
    fn queue_families(&self) -> QueueFamilyPair {
        self.state().families
    }

    fn surface_capabilities(&self) -> VkResult<vk::SurfaceCapabilitiesKHR> {
        let mut s = self.state();
        s.surface_queries += 1;
        match s.surface_error {
            Some(err) => Err(err),
            None => Ok(s.caps),
        }
    }

    fn surface_formats(&self) -> VkResult<Vec<vk::SurfaceFormatKHR>> {
        let s = self.state();
        match s.surface_error {
            Some(err) => Err(err),
            None => Ok(s.formats.clone()),
        }
    }

    fn surface_present_modes(&self) -> VkResult<Vec<vk::PresentModeKHR>> {
        let s = self.state();
        match s.surface_error {
            Some(err) => Err(err),
            None => Ok(s.present_modes.clone()),
        }
    }

    fn create_swapchain(&self, request: &SwapchainRequest<'_>) -> VkResult<vk::SwapchainKHR> {
        let mut s = self.state();
        let extent = request.config.extent;
        assert!(
            extent.width > 0 && extent.height > 0,
            "swapchain built with an empty extent"
        );
        if request.old_swapchain != vk::SwapchainKHR::null() {
            assert!(
                s.is_live(Kind::Swapchain, request.old_swapchain.as_raw()),
                "old swapchain already destroyed"
            );
        }

        let handle = vk::SwapchainKHR::from_raw(s.raw());
        s.track(Kind::Swapchain, handle.as_raw());
        let count = request.config.image_count + s.extra_images;
        let images = (0..count)
            .map(|_| vk::Image::from_raw(s.raw()))
            .collect::<Vec<_>>();
        s.images.insert(handle, images);
        s.next_image.insert(handle, 0);
        s.swapchain_builds.push(SwapchainBuild {
            handle,
            old: request.old_swapchain,
            sharing_mode: request.sharing_mode,
            families: request.queue_family_indices.to_vec(),
            extent: (extent.width, extent.height),
            image_count: request.config.image_count,
            present_mode: request.config.present_mode,
        });
        s.log(format!("create_swapchain:{handle:?}"));
        Ok(handle)
    }

    fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        Ok(self
            .state()
            .images
            .get(&swapchain)
            .cloned()
            .unwrap_or_default())
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut s = self.state();
        s.release(Kind::Swapchain, swapchain.as_raw());
        s.images.remove(&swapchain);
        s.log(format!("destroy_swapchain:{swapchain:?}"));
    }

    fn create_image_view(&self, _image: vk::Image, _format: vk::Format) -> VkResult<vk::ImageView> {
        let mut s = self.state();
        let n = s.views_created;
        s.views_created += 1;
        if s.fail_image_view_at == Some(n) {
            return Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        }
        let view = vk::ImageView::from_raw(s.raw());
        s.track(Kind::ImageView, view.as_raw());
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut s = self.state();
        s.release(Kind::ImageView, view.as_raw());
        s.log(format!("destroy_image_view:{view:?}"));
    }

    fn create_render_pass(&self, _format: vk::Format) -> VkResult<vk::RenderPass> {
        let mut s = self.state();
        let rp = vk::RenderPass::from_raw(s.raw());
        s.track(Kind::RenderPass, rp.as_raw());
        Ok(rp)
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        let mut s = self.state();
        s.release(Kind::RenderPass, render_pass.as_raw());
        s.log(format!("destroy_render_pass:{render_pass:?}"));
    }

    fn create_pipeline(
        &self,
        _render_pass: vk::RenderPass,
        extent: vk::Extent2D,
    ) -> VkResult<(vk::PipelineLayout, vk::Pipeline)> {
        let mut s = self.state();
        if let Some(err) = s.pipeline_error {
            return Err(err);
        }
        s.pipeline_extents.push((extent.width, extent.height));
        let layout = vk::PipelineLayout::from_raw(s.raw());
        let pipeline = vk::Pipeline::from_raw(s.raw());
        s.track(Kind::PipelineLayout, layout.as_raw());
        s.track(Kind::Pipeline, pipeline.as_raw());
        Ok((layout, pipeline))
    }

    fn destroy_pipeline(&self, layout: vk::PipelineLayout, pipeline: vk::Pipeline) {
        let mut s = self.state();
        s.release(Kind::Pipeline, pipeline.as_raw());
        s.release(Kind::PipelineLayout, layout.as_raw());
        s.log(format!("destroy_pipeline:{pipeline:?}"));
    }

    fn create_framebuffer(
        &self,
        render_pass: vk::RenderPass,
        view: vk::ImageView,
        _extent: vk::Extent2D,
    ) -> VkResult<vk::Framebuffer> {
        let mut s = self.state();
        assert!(s.is_live(Kind::RenderPass, render_pass.as_raw()));
        assert!(s.is_live(Kind::ImageView, view.as_raw()));
        let fb = vk::Framebuffer::from_raw(s.raw());
        s.track(Kind::Framebuffer, fb.as_raw());
        Ok(fb)
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        let mut s = self.state();
        s.release(Kind::Framebuffer, framebuffer.as_raw());
        s.log(format!("destroy_framebuffer:{framebuffer:?}"));
    }

    fn allocate_command_buffers(&self, count: u32) -> VkResult<Vec<vk::CommandBuffer>> {
        let mut s = self.state();
        let buffers = (0..count)
            .map(|_| vk::CommandBuffer::from_raw(s.raw()))
            .collect::<Vec<_>>();
        for cmd in &buffers {
            s.track(Kind::CommandBuffer, cmd.as_raw());
        }
        Ok(buffers)
    }

    fn free_command_buffers(&self, buffers: &[vk::CommandBuffer]) {
        let mut s = self.state();
        for cmd in buffers {
            s.release(Kind::CommandBuffer, cmd.as_raw());
            s.commands.remove(cmd);
        }
        s.log(format!("free_command_buffers:{}", buffers.len()));
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        let mut s = self.state();
        s.commands.insert(cmd, Vec::new());
        s.record(cmd, "begin".into());
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VkResult<()> {
        self.state().record(cmd, "end".into());
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        cmd: vk::CommandBuffer,
        _render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
        clear: [f32; 4],
    ) {
        self.state().record(
            cmd,
            format!(
                "begin_render_pass:{framebuffer:?}:{}x{}:{clear:?}",
                extent.width, extent.height
            ),
        );
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        self.state().record(cmd, "end_render_pass".into());
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state().record(cmd, format!("bind_pipeline:{pipeline:?}"));
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32) {
        self.state()
            .record(cmd, format!("draw:{vertex_count}x{instance_count}"));
    }

    fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let mut s = self.state();
        let sem = vk::Semaphore::from_raw(s.raw());
        s.track(Kind::Semaphore, sem.as_raw());
        Ok(sem)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.state().release(Kind::Semaphore, semaphore.as_raw());
    }

    fn create_fence(&self, signaled: bool) -> VkResult<vk::Fence> {
        let mut s = self.state();
        let n = s.fences_created;
        s.fences_created += 1;
        if s.fail_fence_at == Some(n) {
            return Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        }
        let fence = vk::Fence::from_raw(s.raw());
        s.track(Kind::Fence, fence.as_raw());
        s.fences.insert(
            fence,
            FenceState {
                signaled,
                pending: false,
            },
        );
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut s = self.state();
        s.release(Kind::Fence, fence.as_raw());
        let state = s.fences.remove(&fence).unwrap_or_default();
        assert!(!state.pending, "fence {fence:?} destroyed while in flight");
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VkResult<()> {
        let mut s = self.state();
        s.log(format!("wait_fence:{fence:?}"));
        let stall = s.stall;
        let f = s.fences.get_mut(&fence).expect("wait on unknown fence");
        if f.signaled {
            return Ok(());
        }
        assert!(f.pending, "wait on fence {fence:?} that nothing will signal");
        if stall && timeout_ns != u64::MAX {
            return Err(vk::Result::TIMEOUT);
        }
        f.pending = false;
        f.signaled = true;
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> VkResult<()> {
        let mut s = self.state();
        s.log(format!("reset_fence:{fence:?}"));
        let f = s.fences.get_mut(&fence).expect("reset of unknown fence");
        assert!(!f.pending, "reset of fence {fence:?} while in flight");
        f.signaled = false;
        Ok(())
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        _timeout_ns: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        let mut s = self.state();
        assert!(
            s.is_live(Kind::Swapchain, swapchain.as_raw()),
            "acquire from a dead swapchain"
        );
        let call = s.acquires;
        s.acquires += 1;
        s.acquire_semaphores.push(signal);
        s.log("acquire".into());

        let suboptimal = match s.acquire_results.get(&call) {
            Some(&vk::Result::SUBOPTIMAL_KHR) => true,
            Some(&err) => return Err(err),
            None => false,
        };
        let images = s.images.get(&swapchain).cloned().unwrap_or_default();
        let next = s.next_image.entry(swapchain).or_insert(0);
        let index = *next % images.len().max(1);
        *next = index + 1;
        s.last_acquired = images.get(index).copied();
        let index = index as u32;
        s.acquired_images.push(index);
        Ok((index, suboptimal))
    }

    fn queue_submit(&self, submission: &Submission) -> VkResult<()> {
        let mut s = self.state();
        s.log("submit".into());
        if let Some(err) = s.submit_error {
            return Err(err);
        }
        let fence = submission.fence;
        let f = s.fences.get_mut(&fence).expect("submit with unknown fence");
        assert!(
            !f.signaled && !f.pending,
            "submit with fence {fence:?} that was not reset"
        );
        f.pending = true;

        if let Some(image) = s.last_acquired {
            let busy = s.image_owner.get(&image).is_some_and(|&owner| {
                owner != fence && s.fences.get(&owner).is_some_and(|st| st.pending)
            });
            if busy {
                s.image_hazards += 1;
            }
            s.image_owner.insert(image, fence);
        }

        let pending = s.pending_count();
        s.max_pending = s.max_pending.max(pending);
        s.submissions.push(*submission);
        Ok(())
    }

    fn queue_present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        _wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let mut s = self.state();
        let call = s.presents;
        s.presents += 1;
        s.log("present".into());
        s.presented.push((swapchain, image_index));
        match s.present_results.get(&call) {
            Some(&vk::Result::SUBOPTIMAL_KHR) => Ok(true),
            Some(&err) => Err(err),
            None => Ok(false),
        }
    }

    fn device_wait_idle(&self) -> VkResult<()> {
        let mut s = self.state();
        s.wait_idle_calls += 1;
        s.log("wait_idle".into());
        for f in s.fences.values_mut() {
            if f.pending {
                f.pending = false;
                f.signaled = true;
            }
        }
        Ok(())
    }
}

/// A window whose size, resize flag and close request follow a script.
#[derive(Default)]
pub struct FakeWindow {
    pub size: RenderSize,
    pub close_after_polls: Option<usize>,
    pub close_after_waits: Option<usize>,
    pub polls: usize,
    pub waits: usize,
    pub resized: bool,
    /// Size changes applied when the poll with that 1-based number runs.
    pub resize_at_poll: HashMap<usize, RenderSize>,
    /// Sizes delivered one per blocking wait; running out is a test bug.
    pub restore_after_waits: VecDeque<RenderSize>,
}

impl FakeWindow {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: RenderSize::new(width, height),
            ..Self::default()
        }
    }

    pub fn closing_after(mut self, polls: usize) -> Self {
        self.close_after_polls = Some(polls);
        self
    }
}

impl PresentWindow for FakeWindow {
    fn framebuffer_size(&self) -> RenderSize {
        self.size
    }

    fn should_close(&self) -> bool {
        self.close_after_polls.is_some_and(|n| self.polls >= n)
            || self.close_after_waits.is_some_and(|n| self.waits >= n)
    }

    fn poll_events(&mut self) {
        self.polls += 1;
        if let Some(size) = self.resize_at_poll.remove(&self.polls) {
            self.size = size;
            self.resized = true;
        }
    }

    fn wait_events(&mut self) {
        self.waits += 1;
        if self.should_close() {
            return;
        }
        let size = self
            .restore_after_waits
            .pop_front()
            .expect("wait_events called with nothing left to deliver");
        self.size = size;
        self.resized = true;
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}
