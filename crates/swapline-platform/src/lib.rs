// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! winit window driven on demand for the presentation loop.
//!
//! The loop owns the frame cadence, so events are pumped from inside it with
//! `pump_app_events` rather than handing control to `run_app`.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use swapline_render::{PresentWindow, RenderSize};
use tracing::{debug, info};

pub use winit;

use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    raw_window_handle::{
        DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
    },
    window::{Window, WindowId},
};

/// How long `open` waits per pump for the platform to resume the app.
const STARTUP_PUMP: Duration = Duration::from_millis(10);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WindowSettings {
    pub title: String,
    pub width: u32,
    pub height: u32,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self {
            title: "Vulkan".into(),
            width: 800,
            height: 600,
        }
    }
}

struct HostState {
    settings: WindowSettings,
    window: Option<Window>,
    size: RenderSize,
    close_requested: bool,
    resized: bool,
    create_error: Option<String>,
}

impl HostState {
    fn new(settings: WindowSettings) -> Self {
        Self {
            settings,
            window: None,
            size: RenderSize::default(),
            close_requested: false,
            resized: false,
            create_error: None,
        }
    }

    fn apply(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::CloseRequested | WindowEvent::Destroyed => {
                info!("close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(new_size) => {
                let size = RenderSize::new(new_size.width, new_size.height);
                if size != self.size {
                    debug!("resized → {}x{}", size.width, size.height);
                    self.size = size;
                    self.resized = true;
                }
            }
            _ => {}
        }
    }
}

impl ApplicationHandler for HostState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        event_loop.set_control_flow(ControlFlow::Wait);
        if self.window.is_some() {
            return;
        }
        let attrs = Window::default_attributes()
            .with_title(self.settings.title.as_str())
            .with_inner_size(LogicalSize::new(self.settings.width, self.settings.height));
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let inner = window.inner_size();
                self.size = RenderSize::new(inner.width, inner.height);
                info!(
                    "window \"{}\" created at {}x{}",
                    self.settings.title, inner.width, inner.height
                );
                self.window = Some(window);
            }
            Err(err) => {
                self.create_error = Some(err.to_string());
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if let Some(window) = &self.window {
            if window_id != window.id() {
                return;
            }
        }
        self.apply(&event);
    }
}

/// A single window plus the event loop that feeds it.
///
/// Anything holding a surface created from this window must be dropped
/// before the host.
pub struct WindowHost {
    state: HostState,
    event_loop: EventLoop<()>,
    exited: bool,
}

impl WindowHost {
    pub fn open(settings: WindowSettings) -> Result<Self> {
        let event_loop = EventLoop::new().context("create event loop")?;
        let mut host = Self {
            state: HostState::new(settings),
            event_loop,
            exited: false,
        };
        while host.state.window.is_none() {
            host.pump(Some(STARTUP_PUMP));
            if let Some(err) = host.state.create_error.take() {
                bail!("create_window: {err}");
            }
            if host.exited {
                bail!("event loop exited before the window was created");
            }
        }
        Ok(host)
    }

    pub fn window(&self) -> Option<&Window> {
        self.state.window.as_ref()
    }

    fn pump(&mut self, timeout: Option<Duration>) {
        if self.exited {
            return;
        }
        if let PumpStatus::Exit(code) = self.event_loop.pump_app_events(timeout, &mut self.state)
        {
            debug!(code, "event loop exited");
            self.exited = true;
        }
    }
}

impl PresentWindow for WindowHost {
    fn framebuffer_size(&self) -> RenderSize {
        self.state.size
    }

    fn should_close(&self) -> bool {
        self.exited || self.state.close_requested
    }

    fn poll_events(&mut self) {
        self.pump(Some(Duration::ZERO));
    }

    fn wait_events(&mut self) {
        self.pump(None);
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.state.resized)
    }
}

impl HasWindowHandle for WindowHost {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.state
            .window
            .as_ref()
            .ok_or(HandleError::Unavailable)?
            .window_handle()
    }
}

impl HasDisplayHandle for WindowHost {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.event_loop.display_handle()
    }
}
