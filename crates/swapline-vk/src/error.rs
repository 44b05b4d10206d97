// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use thiserror::Error;

/// Problems detected before any swapchain state exists.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("validation layer {0} is not available")]
    MissingLayer(String),

    #[error("instance extension {0} is not supported")]
    MissingInstanceExtension(String),

    #[error("no GPU with graphics + present queues and swapchain support")]
    NoSuitableDevice,
}

#[derive(Error, Debug)]
pub enum PresentError {
    /// Any device status the loop cannot recover from.
    #[error("{op} failed: {result}")]
    Vulkan {
        op: &'static str,
        result: vk::Result,
    },

    #[error("timed out waiting in {op}")]
    Timeout { op: &'static str },

    #[error("surface reports no supported formats")]
    NoSurfaceFormats,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A previous rebuild failed and left nothing to present to.
    #[error("no swapchain available")]
    NoSwapchain,

    #[error("window closed before a swapchain could be created")]
    WindowClosed,

    #[error(transparent)]
    Startup(#[from] StartupError),
}

pub type PresentResult<T> = std::result::Result<T, PresentError>;

impl PresentError {
    pub(crate) fn from_vk(op: &'static str, result: vk::Result) -> Self {
        match result {
            vk::Result::TIMEOUT => Self::Timeout { op },
            result => Self::Vulkan { op, result },
        }
    }
}

/// Attaches the name of the failing device call to a raw status.
pub(crate) trait VkResultExt<T> {
    fn during(self, op: &'static str) -> PresentResult<T>;
}

impl<T> VkResultExt<T> for Result<T, vk::Result> {
    fn during(self, op: &'static str) -> PresentResult<T> {
        self.map_err(|result| PresentError::from_vk(op, result))
    }
}
