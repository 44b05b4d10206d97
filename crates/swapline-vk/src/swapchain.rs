// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use swapline_render::{PresentModePreference, RenderSize};
use tracing::{debug, info};

use crate::capabilities::SurfaceSupport;
use crate::error::{PresentError, PresentResult, VkResultExt};
use crate::gpu::{QueueFamilyPair, SharedGpu, SwapchainRequest};

/// Everything chosen for one swapchain build. Derived from a fresh
/// [`SurfaceSupport`] and never mutated afterwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    pub fn select(
        support: &SurfaceSupport,
        window: RenderSize,
        preference: PresentModePreference,
    ) -> PresentResult<Self> {
        let surface_format =
            choose_surface_format(&support.formats).ok_or(PresentError::NoSurfaceFormats)?;
        Ok(Self {
            format: surface_format.format,
            color_space: surface_format.color_space,
            present_mode: choose_present_mode(&support.present_modes, preference),
            extent: choose_extent(&support.capabilities, window),
            image_count: choose_image_count(&support.capabilities),
        })
    }
}

/// BGRA8 sRGB with a non-linear sRGB color space wherever it sits in the
/// list; otherwise whatever the driver lists first.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first().copied())
}

/// Mailbox when preferred and available, FIFO in every other case.
pub fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: PresentModePreference,
) -> vk::PresentModeKHR {
    match preference {
        PresentModePreference::Mailbox if modes.contains(&vk::PresentModeKHR::MAILBOX) => {
            vk::PresentModeKHR::MAILBOX
        }
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, want: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: want
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: want
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum (0 == "no max").
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let wanted = caps.min_image_count.saturating_add(1);
    if caps.max_image_count == 0 {
        wanted
    } else {
        wanted.min(caps.max_image_count)
    }
}

/// Images are shared across both families only when they differ.
pub fn sharing_for(families: QueueFamilyPair) -> (vk::SharingMode, Vec<u32>) {
    if families.is_unified() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (
            vk::SharingMode::CONCURRENT,
            vec![families.graphics, families.present],
        )
    }
}

fn fmt_name(f: vk::Format) -> &'static str {
    match f {
        vk::Format::B8G8R8A8_UNORM => "B8G8R8A8_UNORM",
        vk::Format::B8G8R8A8_SRGB => "B8G8R8A8_SRGB",
        vk::Format::R8G8B8A8_SRGB => "R8G8B8A8_SRGB",
        vk::Format::R8G8B8A8_UNORM => "R8G8B8A8_UNORM",
        vk::Format::A2B10G10R10_UNORM_PACK32 => "A2B10G10R10_UNORM",
        vk::Format::R16G16B16A16_SFLOAT => "R16G16B16A16_SFLOAT",
        _ => "OTHER",
    }
}

fn pm_name(m: vk::PresentModeKHR) -> &'static str {
    match m {
        vk::PresentModeKHR::FIFO => "FIFO",
        vk::PresentModeKHR::MAILBOX => "MAILBOX",
        vk::PresentModeKHR::IMMEDIATE => "IMMEDIATE",
        vk::PresentModeKHR::FIFO_RELAXED => "FIFO_RELAXED",
        _ => "OTHER",
    }
}

/// The presentable images plus the views this system owns over them.
///
/// Images belong to the swapchain and are released with it; views are
/// destroyed here. Dropping tears down views first, then the swapchain.
pub struct Swapchain {
    gpu: SharedGpu,
    handle: vk::SwapchainKHR,
    config: SwapchainConfig,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
}

impl Swapchain {
    /// Queries the surface, applies the selection policy and creates the
    /// swapchain with one view per image. `old` is handed to the driver so
    /// it can recycle resources; the caller still destroys it afterwards.
    pub fn build(
        gpu: &SharedGpu,
        window: RenderSize,
        preference: PresentModePreference,
        old: vk::SwapchainKHR,
    ) -> PresentResult<Self> {
        let support = SurfaceSupport::query(gpu.as_ref())?;
        let config = SwapchainConfig::select(&support, window, preference)?;
        let (sharing_mode, family_indices) = sharing_for(gpu.queue_families());

        info!(
            "format: {} / {:?}, present_mode: {}, extent: {}x{}, images(min={} → picked={}), sharing: {:?}",
            fmt_name(config.format),
            config.color_space,
            pm_name(config.present_mode),
            config.extent.width,
            config.extent.height,
            support.capabilities.min_image_count,
            config.image_count,
            sharing_mode,
        );

        let handle = gpu
            .create_swapchain(&SwapchainRequest {
                config: &config,
                pre_transform: support.capabilities.current_transform,
                sharing_mode,
                queue_family_indices: &family_indices,
                old_swapchain: old,
            })
            .during("create_swapchain")?;

        let mut swapchain = Self {
            gpu: gpu.clone(),
            handle,
            config,
            images: Vec::new(),
            views: Vec::new(),
        };
        swapchain.images = gpu.swapchain_images(handle).during("get_swapchain_images")?;
        swapchain.views.reserve(swapchain.images.len());
        for &image in &swapchain.images {
            let view = gpu
                .create_image_view(image, config.format)
                .during("create_image_view")?;
            swapchain.views.push(view);
        }
        debug!(
            "swapchain {:?}: {} images, {} views",
            handle,
            swapchain.images.len(),
            swapchain.views.len()
        );
        Ok(swapchain)
    }

    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }

    pub fn config(&self) -> &SwapchainConfig {
        &self.config
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    pub fn format(&self) -> vk::Format {
        self.config.format
    }

    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    pub fn views(&self) -> &[vk::ImageView] {
        &self.views
    }

    /// Number of images the driver actually handed back. May exceed the
    /// requested minimum in `config().image_count`.
    pub fn image_count(&self) -> usize {
        self.views.len()
    }

    /// Destroys the views but keeps the swapchain alive so it can be passed
    /// as `old` to the next build.
    pub fn retire(mut self) -> RetiredSwapchain {
        self.destroy_views();
        let handle = std::mem::replace(&mut self.handle, vk::SwapchainKHR::null());
        RetiredSwapchain {
            gpu: self.gpu.clone(),
            handle,
        }
    }

    fn destroy_views(&mut self) {
        for view in self.views.drain(..) {
            self.gpu.destroy_image_view(view);
        }
        self.images.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_views();
        if self.handle != vk::SwapchainKHR::null() {
            self.gpu.destroy_swapchain(self.handle);
        }
    }
}

/// A swapchain whose views are gone, waiting to be replaced.
pub struct RetiredSwapchain {
    gpu: SharedGpu,
    handle: vk::SwapchainKHR,
}

impl RetiredSwapchain {
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.handle
    }
}

impl Drop for RetiredSwapchain {
    fn drop(&mut self) {
        self.gpu.destroy_swapchain(self.handle);
    }
}
