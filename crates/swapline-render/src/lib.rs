// SPDX-License-Identifier: CEPL-1.0
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderSize {
    pub width: u32,
    pub height: u32,
}

impl RenderSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// True while the window is minimized (either side is zero).
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Windowing collaborator consumed by the presentation loop.
pub trait PresentWindow {
    /// Framebuffer size in pixels; zero while minimized.
    fn framebuffer_size(&self) -> RenderSize;
    fn should_close(&self) -> bool;
    /// Process pending events without blocking.
    fn poll_events(&mut self);
    /// Block until at least one event arrives.
    fn wait_events(&mut self);
    /// Returns and clears the pending framebuffer-resized notification.
    fn take_resized(&mut self) -> bool;
}

/// Anything a presentation surface can be created from.
pub trait SurfaceSource: HasWindowHandle + HasDisplayHandle {}

impl<T: HasWindowHandle + HasDisplayHandle + ?Sized> SurfaceSource for T {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PresentModePreference {
    /// Low-latency triple buffering when available, FIFO otherwise.
    #[default]
    Mailbox,
    /// Always vsync-locked FIFO.
    Fifo,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PresentConfig {
    pub frames_in_flight: usize,
    pub clear_color: [f32; 4],
    pub present_mode: PresentModePreference,
    /// `None` waits until signaled.
    pub wait_timeout: Option<Duration>,
}

pub const DEFAULT_FRAMES_IN_FLIGHT: usize = 2;

impl Default for PresentConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: DEFAULT_FRAMES_IN_FLIGHT,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            present_mode: PresentModePreference::Mailbox,
            wait_timeout: None,
        }
    }
}

impl PresentConfig {
    /// Timeout in nanoseconds as the device API expects it.
    pub fn wait_timeout_ns(&self) -> u64 {
        self.wait_timeout
            .map_or(u64::MAX, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
    }
}
