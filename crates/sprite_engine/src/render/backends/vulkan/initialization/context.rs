//! Vulkan context management
//!
//! Instance creation, validation plumbing, and physical device selection.

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{DynamicRendering, Swapchain as SwapchainLoader};
use ash::vk;
use ash::{Entry, Instance};
use std::ffi::{CStr, CString};
use std::path::PathBuf;
use thiserror::Error;

use crate::render::window::SurfaceProvider;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// None of the candidate formats support the requested features
    #[error("No supported format among {candidates:?}")]
    UnsupportedFormat {
        /// Formats that were tried, in preference order
        candidates: Vec<vk::Format>,
    },

    /// Descriptor pool quota exhausted
    #[error("Descriptor pool out of memory")]
    OutOfPoolMemory,

    /// Device memory allocator failure
    #[error("GPU allocation failed: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    /// Shader bytecode could not be loaded
    #[error("Failed to load shader {path:?}: {reason}")]
    ShaderLoad {
        /// Shader file path
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Layout pair missing from the transition table
    #[error("Unsupported image layout transition {from:?} -> {to:?}")]
    UnsupportedLayoutTransition {
        /// Current layout
        from: vk::ImageLayout,
        /// Requested layout
        to: vk::ImageLayout,
    },
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

const VALIDATION_LAYER: &CStr = unsafe { CStr::from_bytes_with_nul_unchecked(b"VK_LAYER_KHRONOS_validation\0") };

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    /// Vulkan entry point
    pub entry: Entry,
    /// Vulkan instance handle
    pub instance: Instance,
    /// Debug utilities extension, present when validation is enabled
    pub debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Create a Vulkan 1.3 instance, optionally with validation layers
    pub fn new(window: &dyn SurfaceProvider, app_name: &str, enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to load Vulkan: {:?}", e)))?;

        let enable_validation = enable_validation && Self::validation_layer_available(&entry);

        let app_name_cstr = CString::new(app_name)
            .map_err(|_| VulkanError::InitializationFailed("Application name contains NUL".to_string()))?;
        let engine_name_cstr = CString::new("SpriteEngine").unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name_cstr)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_3);

        let required_extensions = window
            .required_instance_extensions()
            .map_err(|e| VulkanError::InitializationFailed(format!("Failed to get required extensions: {}", e)))?;

        let cstr_extensions = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| VulkanError::InitializationFailed("Extension name contains NUL".to_string()))?;

        let mut extensions: Vec<*const std::ffi::c_char> = cstr_extensions.iter().map(|ext| ext.as_ptr()).collect();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names: Vec<*const std::ffi::c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = unsafe { entry.create_instance(&create_info, None).map_err(VulkanError::Api)? };

        let (debug_utils, debug_messenger) = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            let messenger = Self::setup_debug_messenger(&debug_utils)?;
            log::info!("Vulkan validation enabled");
            (Some(debug_utils), Some(messenger))
        } else {
            (None, None)
        };

        Ok(Self {
            entry,
            instance,
            debug_utils,
            debug_messenger,
        })
    }

    fn validation_layer_available(entry: &Entry) -> bool {
        let available = entry
            .enumerate_instance_layer_properties()
            .map(|layers| {
                layers
                    .iter()
                    .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
            })
            .unwrap_or(false);

        if !available {
            log::warn!("Validation requested but {:?} is not installed", VALIDATION_LAYER);
        }
        available
    }

    fn setup_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        unsafe {
            debug_utils
                .create_debug_utils_messenger(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

/// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Device extensions the renderer cannot run without
pub fn required_device_extensions() -> [&'static CStr; 2] {
    [SwapchainLoader::name(), DynamicRendering::name()]
}

/// Preference score for a device type; higher wins, zero is unusable
pub fn device_type_score(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 1000,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 100,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 10,
        vk::PhysicalDeviceType::CPU => 1,
        _ => 1,
    }
}

/// Physical device selection and capabilities
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device properties and limits
    pub properties: vk::PhysicalDeviceProperties,
    /// Index of the graphics queue family
    pub graphics_family: u32,
    /// Index of the presentation queue family
    pub present_family: u32,
}

impl PhysicalDeviceInfo {
    /// Pick the best suitable GPU, preferring discrete adapters
    pub fn select_suitable_device(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> VulkanResult<Self> {
        let devices = unsafe { instance.enumerate_physical_devices().map_err(VulkanError::Api)? };

        let best = devices
            .into_iter()
            .filter_map(|device| match Self::evaluate_device(instance, device, surface, surface_loader) {
                Ok(info) => Some(info),
                Err(reason) => {
                    log::debug!("Skipping GPU {:?}: {}", device, reason);
                    None
                }
            })
            .max_by_key(|info| device_type_score(info.properties.device_type));

        let info = best.ok_or_else(|| VulkanError::InitializationFailed("No suitable GPU found".to_string()))?;
        log::info!("Selected GPU: {}", info.name());
        Ok(info)
    }

    /// Human-readable adapter name
    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }

    fn evaluate_device(
        instance: &Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::extensions::khr::Surface,
    ) -> Result<Self, String> {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        if properties.api_version < vk::API_VERSION_1_3 {
            return Err("Vulkan 1.3 not supported".to_string());
        }

        let features = unsafe { instance.get_physical_device_features(device) };
        if features.sampler_anisotropy == vk::FALSE {
            return Err("samplerAnisotropy not supported".to_string());
        }

        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::default();
        let mut features2 = vk::PhysicalDeviceFeatures2::builder().push_next(&mut dynamic_rendering);
        unsafe { instance.get_physical_device_features2(device, &mut features2) };
        if dynamic_rendering.dynamic_rendering == vk::FALSE {
            return Err("dynamicRendering not supported".to_string());
        }

        let extensions = unsafe {
            instance
                .enumerate_device_extension_properties(device)
                .map_err(|e| format!("{:?}", e))?
        };
        let missing = required_device_extensions().into_iter().find(|required| {
            !extensions
                .iter()
                .any(|available| unsafe { CStr::from_ptr(available.extension_name.as_ptr()) } == *required)
        });
        if let Some(missing) = missing {
            return Err(format!("missing extension {:?}", missing));
        }

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let mut graphics_family = None;
        let mut present_family = None;

        for (index, family) in queue_families.iter().enumerate() {
            let index = index as u32;

            if family.queue_flags.contains(vk::QueueFlags::GRAPHICS) && graphics_family.is_none() {
                graphics_family = Some(index);
            }

            let present_support = unsafe {
                surface_loader
                    .get_physical_device_surface_support(device, index, surface)
                    .unwrap_or(false)
            };
            if present_support && present_family.is_none() {
                present_family = Some(index);
            }

            if graphics_family.is_some() && present_family.is_some() {
                break;
            }
        }

        Ok(Self {
            device,
            properties,
            graphics_family: graphics_family.ok_or("no graphics queue family")?,
            present_family: present_family.ok_or("no present queue family")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discrete_gpu_preferred() {
        let discrete = device_type_score(vk::PhysicalDeviceType::DISCRETE_GPU);
        let integrated = device_type_score(vk::PhysicalDeviceType::INTEGRATED_GPU);
        let cpu = device_type_score(vk::PhysicalDeviceType::CPU);
        assert!(discrete > integrated);
        assert!(integrated > cpu);
    }

    #[test]
    fn test_required_extensions() {
        let names: Vec<String> = required_device_extensions()
            .iter()
            .map(|name| name.to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&"VK_KHR_swapchain".to_string()));
        assert!(names.contains(&"VK_KHR_dynamic_rendering".to_string()));
    }

    #[test]
    fn test_error_messages() {
        let err = VulkanError::UnsupportedFormat { candidates: vec![vk::Format::D32_SFLOAT] };
        assert!(err.to_string().contains("D32_SFLOAT"));
        assert_eq!(VulkanError::OutOfPoolMemory.to_string(), "Descriptor pool out of memory");
    }
}
