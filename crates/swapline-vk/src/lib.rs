// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Vulkan presentation engine: swapchain lifecycle, frame pacing and the
//! render loop that ties them together.

mod ash_gpu;
mod bootstrap;
pub mod capabilities;
mod error;
pub mod gpu;
mod presenter;
pub mod recorder;
pub mod swapchain;
pub mod sync;
pub mod targets;

#[cfg(test)]
mod testing;

pub use ash_gpu::AshGpu;
pub use bootstrap::{validation_for_profile, BootstrapOptions};
pub use capabilities::SurfaceSupport;
pub use error::{PresentError, PresentResult, StartupError};
pub use gpu::{GpuDevice, QueueFamilyPair, SharedGpu, Submission, SwapchainRequest};
pub use presenter::{FrameOutcome, PresentStats, Presenter, RebuildReason};
pub use recorder::{DrawWork, TriangleDraw};
pub use swapchain::SwapchainConfig;
