// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::prelude::VkResult;
use ash::vk;

use crate::error::{PresentResult, VkResultExt};
use crate::gpu::GpuDevice;

/// Snapshot of what a surface supports on one device. Re-queried on every
/// (re)build; never cached across builds.
#[derive(Clone, Debug)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceSupport {
    pub fn query(gpu: &dyn GpuDevice) -> PresentResult<Self> {
        Ok(Self {
            capabilities: gpu
                .surface_capabilities()
                .during("get_physical_device_surface_capabilities")?,
            formats: gpu
                .surface_formats()
                .during("get_physical_device_surface_formats")?,
            present_modes: gpu
                .surface_present_modes()
                .during("get_physical_device_surface_present_modes")?,
        })
    }

    /// Direct query used during device selection, before a [`GpuDevice`] exists.
    ///
    /// # Safety
    /// `phys` and `surface` must be valid handles created from the instance
    /// `surface_loader` was loaded for.
    pub(crate) unsafe fn query_raw(
        surface_loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<Self> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader.get_physical_device_surface_capabilities(phys, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(phys, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(phys, surface)?,
            })
        }
    }

    /// A swapchain can only be built with at least one format and one mode.
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }

    /// `maxImageCount == 0` means the surface puts no upper bound on images.
    pub fn max_image_count(&self) -> Option<u32> {
        match self.capabilities.max_image_count {
            0 => None,
            n => Some(n),
        }
    }
}
