// SPDX-License-Identifier: CEPL-1.0
//! One-shot setup: instance, debug messenger, device selection, logical
//! device. Nothing here has runtime state; failures are fatal at startup.

use std::collections::BTreeSet;
use std::ffi::{c_char, c_void, CStr};
use std::sync::Arc;

use anyhow::{Context, Result};
use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::{vk, Entry, Instance};
use raw_window_handle::RawDisplayHandle;
use swapline_core::{DiagnosticSink, Severity};
use tracing::{debug, info, warn};

use crate::capabilities::SurfaceSupport;
use crate::error::StartupError;
use crate::gpu::{QueueFamilies, QueueFamilyPair};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Debug)]
pub struct BootstrapOptions {
    pub app_name: String,
    pub enable_validation: bool,
}

impl Default for BootstrapOptions {
    fn default() -> Self {
        Self {
            app_name: "swapline".into(),
            enable_validation: validation_for_profile(std::env::var("PROFILE").ok().as_deref()),
        }
    }
}

/// Validation is on unless the build profile says `prod`.
pub fn validation_for_profile(profile: Option<&str>) -> bool {
    profile != Some("prod")
}

/// First entry of `required` that `available` does not list.
fn first_missing<'a>(required: &[&'a CStr], available: &[&'a CStr]) -> Option<&'a CStr> {
    required
        .iter()
        .copied()
        .find(|want| !available.contains(want))
}

fn severity_from_vk(flags: vk::DebugUtilsMessageSeverityFlagsEXT) -> Severity {
    if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Severity::Error
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Severity::Warning
    } else if flags.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        Severity::Info
    } else {
        Severity::Verbose
    }
}

/// # Safety
/// `ptr` must be null or point at a NUL-terminated string.
unsafe fn lossy(ptr: *const c_char) -> String {
    if ptr.is_null() {
        String::new()
    } else {
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
    }
}

/// Forwards every message to the `Arc<dyn DiagnosticSink>` behind `user`.
unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || user.is_null() {
        return vk::FALSE;
    }
    let sink = unsafe { &*(user as *const Arc<dyn DiagnosticSink>) };
    let data = unsafe { &*data };
    let source = unsafe { lossy(data.p_message_id_name) };
    let message = unsafe { lossy(data.p_message) };
    sink.report(
        severity_from_vk(severity),
        data.message_id_number,
        &source,
        &message,
    );
    vk::FALSE
}

/// Creates the instance with the window-system extensions, plus debug utils
/// and the validation layer when requested. Everything is checked against
/// what the loader reports before creation.
pub(crate) unsafe fn create_instance(
    entry: &Entry,
    display: RawDisplayHandle,
    options: &BootstrapOptions,
) -> Result<Instance> {
    let mut extensions = ash_window::enumerate_required_extensions(display)
        .context("enumerate_required_extensions")?
        .to_vec();
    if options.enable_validation {
        extensions.push(debug_utils::NAME.as_ptr());
    }
    let layers: Vec<&CStr> = if options.enable_validation {
        vec![VALIDATION_LAYER]
    } else {
        Vec::new()
    };

    let available_exts = unsafe { entry.enumerate_instance_extension_properties(None) }
        .context("enumerate_instance_extension_properties")?;
    let available_exts: Vec<&CStr> = available_exts
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
        .collect();
    let required_exts: Vec<&CStr> = extensions
        .iter()
        .map(|&p| unsafe { CStr::from_ptr(p) })
        .collect();
    if let Some(missing) = first_missing(&required_exts, &available_exts) {
        return Err(StartupError::MissingInstanceExtension(
            missing.to_string_lossy().into_owned(),
        )
        .into());
    }

    let available_layers = unsafe { entry.enumerate_instance_layer_properties() }
        .context("enumerate_instance_layer_properties")?;
    let available_layers: Vec<&CStr> = available_layers
        .iter()
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) })
        .collect();
    if let Some(missing) = first_missing(&layers, &available_layers) {
        return Err(StartupError::MissingLayer(missing.to_string_lossy().into_owned()).into());
    }
    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();

    let app_name = std::ffi::CString::new(options.app_name.as_str())
        .context("application name contains a NUL byte")?;
    let app_info = vk::ApplicationInfo {
        s_type: vk::StructureType::APPLICATION_INFO,
        p_application_name: app_name.as_ptr(),
        application_version: vk::make_api_version(0, 1, 0, 0),
        p_engine_name: c"swapline".as_ptr(),
        engine_version: vk::make_api_version(0, 1, 0, 0),
        api_version: vk::API_VERSION_1_0,
        ..Default::default()
    };

    let create_info = vk::InstanceCreateInfo {
        s_type: vk::StructureType::INSTANCE_CREATE_INFO,
        p_application_info: &app_info,
        enabled_extension_count: extensions.len() as u32,
        pp_enabled_extension_names: extensions.as_ptr(),
        enabled_layer_count: layer_ptrs.len() as u32,
        pp_enabled_layer_names: layer_ptrs.as_ptr(),
        ..Default::default()
    };

    info!(
        validation = options.enable_validation,
        extensions = required_exts.len(),
        "creating Vulkan instance"
    );
    Ok(unsafe { entry.create_instance(&create_info, None) }.context("create_instance")?)
}

/// Debug messenger for error, warning and info messages.
///
/// # Safety
/// `sink` must outlive the returned messenger.
pub(crate) unsafe fn create_debug_messenger(
    loader: &debug_utils::Instance,
    sink: &Arc<dyn DiagnosticSink>,
) -> VkResult<vk::DebugUtilsMessengerEXT> {
    let ci = vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        p_user_data: sink as *const Arc<dyn DiagnosticSink> as *mut c_void,
        ..Default::default()
    };
    unsafe { loader.create_debug_utils_messenger(&ci, None) }
}

/// Graphics family = first family with graphics support; present family =
/// first family that can present to `surface`. Stops once both are known.
pub(crate) unsafe fn find_queue_families(
    instance: &Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> VkResult<QueueFamilies> {
    let props = unsafe { instance.get_physical_device_queue_family_properties(phys) };
    let mut found = QueueFamilies::default();
    for (i, family) in props.iter().enumerate() {
        let index = i as u32;
        if found.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            found.graphics = Some(index);
        }
        if found.present.is_none()
            && unsafe {
                surface_loader.get_physical_device_surface_support(phys, index, surface)
            }?
        {
            found.present = Some(index);
        }
        if found.complete().is_some() {
            break;
        }
    }
    Ok(found)
}

unsafe fn supports_swapchain(instance: &Instance, phys: vk::PhysicalDevice) -> VkResult<bool> {
    let exts = unsafe { instance.enumerate_device_extension_properties(phys) }?;
    Ok(exts
        .iter()
        .any(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) } == swapchain::NAME))
}

/// First device with complete queue families, the swapchain extension and
/// at least one surface format and present mode.
pub(crate) unsafe fn pick_physical_device(
    instance: &Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> Result<(vk::PhysicalDevice, QueueFamilyPair)> {
    let devices =
        unsafe { instance.enumerate_physical_devices() }.context("enumerate_physical_devices")?;
    for phys in devices {
        let props = unsafe { instance.get_physical_device_properties(phys) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }.to_string_lossy();

        let families = unsafe { find_queue_families(instance, surface_loader, phys, surface) }?;
        let Some(pair) = families.complete() else {
            debug!("{name}: missing graphics or present queue family");
            continue;
        };
        if !unsafe { supports_swapchain(instance, phys) }? {
            debug!("{name}: no {:?}", swapchain::NAME);
            continue;
        }
        let support = unsafe { SurfaceSupport::query_raw(surface_loader, phys, surface) }?;
        if !support.is_adequate() {
            warn!("{name}: surface reports no formats or present modes");
            continue;
        }
        info!(
            "using GPU {name} (graphics family {}, present family {})",
            pair.graphics, pair.present
        );
        return Ok((phys, pair));
    }
    Err(StartupError::NoSuitableDevice.into())
}

/// Logical device with one queue per unique family and the swapchain
/// extension enabled.
pub(crate) unsafe fn create_logical_device(
    instance: &Instance,
    phys: vk::PhysicalDevice,
    families: QueueFamilyPair,
    enable_validation: bool,
) -> VkResult<ash::Device> {
    let unique: BTreeSet<u32> = [families.graphics, families.present].into_iter().collect();
    let priorities = [1.0_f32];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique
        .iter()
        .map(|&family| vk::DeviceQueueCreateInfo {
            s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
            queue_family_index: family,
            queue_count: 1,
            p_queue_priorities: priorities.as_ptr(),
            ..Default::default()
        })
        .collect();

    let device_exts = [swapchain::NAME.as_ptr()];
    // Device layers are deprecated but older loaders still read them.
    let layers = [VALIDATION_LAYER.as_ptr()];
    let layer_count = if enable_validation { layers.len() } else { 0 };
    let features = vk::PhysicalDeviceFeatures::default();

    let dinfo = vk::DeviceCreateInfo {
        s_type: vk::StructureType::DEVICE_CREATE_INFO,
        queue_create_info_count: queue_infos.len() as u32,
        p_queue_create_infos: queue_infos.as_ptr(),
        enabled_extension_count: device_exts.len() as u32,
        pp_enabled_extension_names: device_exts.as_ptr(),
        enabled_layer_count: layer_count as u32,
        pp_enabled_layer_names: layers.as_ptr(),
        p_enabled_features: &features,
        ..Default::default()
    };
    unsafe { instance.create_device(phys, &dinfo, None) }
}
