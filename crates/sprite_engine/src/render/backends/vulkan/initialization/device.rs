//! Graphics device
//!
//! Owns the logical device, its queues, the command pool, and the
//! device-memory allocator. Everything else in the backend borrows it through
//! an `Arc<GraphicsDevice>`; it is torn down last.

use ash::extensions::khr::{DynamicRendering, Surface, Swapchain as SwapchainLoader};
use ash::vk;
use ash::vk::Handle;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use gpu_allocator::{AllocationSizes, AllocatorDebugSettings, MemoryLocation};
use std::ffi::CString;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::context::{required_device_extensions, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
use crate::core::RendererConfig;
use crate::render::window::SurfaceProvider;

/// First line of the memory report written at teardown
pub const MEMORY_REPORT_HEADER: &str = "=== GPU MEMORY REPORT ===";

/// Depth formats in preference order
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Return the first candidate whose properties for `tiling` contain `features`.
///
/// `properties` is queried once per candidate, in order.
pub fn select_supported_format<F>(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties: F,
) -> VulkanResult<vk::Format>
where
    F: FnMut(vk::Format) -> vk::FormatProperties,
{
    candidates
        .iter()
        .copied()
        .find(|&format| {
            let props = properties(format);
            match tiling {
                vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
                vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
                _ => false,
            }
        })
        .ok_or_else(|| VulkanError::UnsupportedFormat {
            candidates: candidates.to_vec(),
        })
}

/// Write the allocator report to `path`, replacing any previous report
pub fn write_memory_report(path: &Path, report: &str) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    writeln!(file, "{}", MEMORY_REPORT_HEADER)?;
    writeln!(file, "{}", report)?;
    file.flush()
}

/// GPU execution context: logical device, queues, command pool, allocator
pub struct GraphicsDevice {
    surface_loader: Surface,
    surface: vk::SurfaceKHR,
    physical: PhysicalDeviceInfo,
    device: ash::Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: SwapchainLoader,
    dynamic_rendering: DynamicRendering,
    command_pool: vk::CommandPool,
    allocator: Mutex<Option<Allocator>>,
    memory_report_path: PathBuf,
    // Declared last so the instance outlives every handle above
    instance: VulkanInstance,
}

impl GraphicsDevice {
    /// Create the instance, surface, logical device, command pool, and allocator
    pub fn new(window: &dyn SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, &config.application_name, config.validation_enabled())?;
        let surface_loader = Surface::new(&instance.entry, &instance.instance);

        let surface = window
            .create_surface(instance.instance.handle())
            .map_err(VulkanError::InitializationFailed)?;

        let physical = match PhysicalDeviceInfo::select_suitable_device(&instance.instance, surface, &surface_loader) {
            Ok(physical) => physical,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let device = match Self::create_logical_device(&instance.instance, &physical) {
            Ok(device) => device,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let graphics_queue = unsafe { device.get_device_queue(physical.graphics_family, 0) };
        let present_queue = unsafe { device.get_device_queue(physical.present_family, 0) };

        let pool_info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(physical.graphics_family);
        let command_pool = unsafe { device.create_command_pool(&pool_info, None) };

        let allocator = command_pool.map_err(VulkanError::Api).and_then(|pool| {
            Allocator::new(&AllocatorCreateDesc {
                instance: instance.instance.clone(),
                device: device.clone(),
                physical_device: physical.device,
                debug_settings: AllocatorDebugSettings {
                    log_leaks_on_shutdown: false,
                    ..AllocatorDebugSettings::default()
                },
                buffer_device_address: false,
                allocation_sizes: AllocationSizes::default(),
            })
            .map(|allocator| (pool, allocator))
            .map_err(|e| {
                unsafe { device.destroy_command_pool(pool, None) };
                VulkanError::Allocation(e)
            })
        });

        let (command_pool, allocator) = match allocator {
            Ok(created) => created,
            Err(e) => {
                unsafe {
                    device.destroy_device(None);
                    surface_loader.destroy_surface(surface, None);
                }
                return Err(e);
            }
        };

        let swapchain_loader = SwapchainLoader::new(&instance.instance, &device);
        let dynamic_rendering = DynamicRendering::new(&instance.instance, &device);

        log::info!(
            "Graphics device ready on {} (graphics family {}, present family {})",
            physical.name(),
            physical.graphics_family,
            physical.present_family
        );

        Ok(Self {
            surface_loader,
            surface,
            physical,
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
            dynamic_rendering,
            command_pool,
            allocator: Mutex::new(Some(allocator)),
            memory_report_path: config.memory_report_path.clone(),
            instance,
        })
    }

    fn create_logical_device(instance: &ash::Instance, physical: &PhysicalDeviceInfo) -> VulkanResult<ash::Device> {
        let mut families = vec![physical.graphics_family];
        if physical.present_family != physical.graphics_family {
            families.push(physical.present_family);
        }

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = families
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_names: Vec<*const std::ffi::c_char> =
            required_device_extensions().iter().map(|name| name.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features)
            .push_next(&mut dynamic_rendering);

        unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create logical device: {:?}", e)))
        }
    }

    /// Logical device handle
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Instance the device was created from
    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    /// Selected physical device
    pub fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Queue used for rendering and setup transfers
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Queue used for presentation
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    /// Presentation surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    /// Surface extension functions
    pub fn surface_loader(&self) -> &Surface {
        &self.surface_loader
    }

    /// Swapchain extension functions
    pub fn swapchain_loader(&self) -> &SwapchainLoader {
        &self.swapchain_loader
    }

    /// Dynamic rendering extension functions
    pub fn dynamic_rendering(&self) -> &DynamicRendering {
        &self.dynamic_rendering
    }

    /// Command pool for per-frame and single-time command buffers
    pub fn command_pool(&self) -> vk::CommandPool {
        self.command_pool
    }

    /// Alignment for flushing non-coherent mapped ranges
    pub fn non_coherent_atom_size(&self) -> vk::DeviceSize {
        self.physical.properties.limits.non_coherent_atom_size
    }

    /// Anisotropy to request from samplers, capped by the device limit
    pub fn max_sampler_anisotropy(&self) -> f32 {
        self.physical.properties.limits.max_sampler_anisotropy.min(16.0)
    }

    /// First candidate whose format properties satisfy `features` for `tiling`
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> VulkanResult<vk::Format> {
        select_supported_format(candidates, tiling, features, |format| unsafe {
            self.instance
                .instance
                .get_physical_device_format_properties(self.physical.device, format)
        })
    }

    /// Depth attachment format for this device
    pub fn find_depth_format(&self) -> VulkanResult<vk::Format> {
        self.find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
        )
    }

    fn lock_allocator(&self) -> MutexGuard<'_, Option<Allocator>> {
        self.allocator.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate device memory for a resource.
    ///
    /// `GpuOnly` allocations are never mapped; `CpuToGpu` and `GpuToCpu`
    /// allocations come back persistently mapped by the allocator.
    pub fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> VulkanResult<Allocation> {
        let mut guard = self.lock_allocator();
        let allocator = guard.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "allocator already released".to_string(),
        })?;

        let allocation = allocator.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        Ok(allocation)
    }

    /// Return an allocation to the allocator
    pub fn free(&self, allocation: Allocation) {
        if allocation.is_null() {
            return;
        }
        let mut guard = self.lock_allocator();
        match guard.as_mut() {
            Some(allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    log::error!("Failed to free GPU allocation: {}", e);
                }
            }
            None => log::error!("GPU allocation outlived the allocator"),
        }
    }

    /// Record and run a one-off command buffer, blocking until the queue is idle.
    ///
    /// Setup-time only. Never call this from the per-frame path.
    pub fn execute_single_time<F>(&self, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer) -> VulkanResult<()>,
    {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(self.command_pool)
            .command_buffer_count(1);

        let command_buffer = unsafe {
            self.device
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
                .first()
                .copied()
                .ok_or(VulkanError::Api(vk::Result::ERROR_OUT_OF_HOST_MEMORY))?
        };

        let result = self.record_and_submit(command_buffer, record);

        unsafe {
            self.device.free_command_buffers(self.command_pool, &[command_buffer]);
        }

        log::debug!("Single-time command buffer completed");
        result
    }

    fn record_and_submit<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> VulkanResult<()>
    where
        F: FnOnce(vk::CommandBuffer) -> VulkanResult<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }

        record(command_buffer)?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(&command_buffers);
        unsafe {
            self.device.end_command_buffer(command_buffer).map_err(VulkanError::Api)?;
            self.device
                .queue_submit(self.graphics_queue, &[submit_info.build()], vk::Fence::null())
                .map_err(VulkanError::Api)?;
            self.device
                .queue_wait_idle(self.graphics_queue)
                .map_err(VulkanError::Api)
        }
    }

    /// Device-side copy of `size` bytes between buffers
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) -> VulkanResult<()> {
        self.execute_single_time(|cmd| {
            let region = vk::BufferCopy::builder().src_offset(0).dst_offset(0).size(size);
            unsafe {
                self.device.cmd_copy_buffer(cmd, src, dst, &[region.build()]);
            }
            Ok(())
        })
    }

    /// Attach a debug name to a Vulkan object. No-op without validation.
    pub fn set_object_name<H: Handle>(&self, handle: H, name: &str) {
        let Some(debug_utils) = &self.instance.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };

        let info = vk::DebugUtilsObjectNameInfoEXT::builder()
            .object_type(H::TYPE)
            .object_handle(handle.as_raw())
            .object_name(&name);

        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(self.device.handle(), &info) } {
            log::debug!("Failed to name object {:?}: {:?}", name, e);
        }
    }

    /// Open a labelled region in a command buffer. No-op without validation.
    pub fn begin_label(&self, command_buffer: vk::CommandBuffer, name: &str) {
        let Some(debug_utils) = &self.instance.debug_utils else {
            return;
        };
        let Ok(name) = CString::new(name) else {
            return;
        };

        let label = vk::DebugUtilsLabelEXT::builder()
            .label_name(&name)
            .color([0.3, 0.6, 0.9, 1.0]);
        unsafe { debug_utils.cmd_begin_debug_utils_label(command_buffer, &label) };
    }

    /// Close the innermost labelled region
    pub fn end_label(&self, command_buffer: vk::CommandBuffer) {
        if let Some(debug_utils) = &self.instance.debug_utils {
            unsafe { debug_utils.cmd_end_debug_utils_label(command_buffer) };
        }
    }

    /// Block until all submitted GPU work has finished
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device.device_wait_idle().map_err(VulkanError::Api) }
    }
}

impl Drop for GraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("device_wait_idle failed during teardown: {:?}", e);
            }
        }

        let allocator = self.allocator.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(allocator) = allocator {
            let report = format!("{:?}", allocator);
            match write_memory_report(&self.memory_report_path, &report) {
                Ok(()) => log::info!("GPU memory report written to {:?}", self.memory_report_path),
                Err(e) => log::error!("Failed to write GPU memory report to {:?}: {}", self.memory_report_path, e),
            }
            allocator.report_memory_leaks(log::Level::Warn);
            drop(allocator);
        }

        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
        log::debug!("Graphics device destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn props(optimal: vk::FormatFeatureFlags, linear: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            linear_tiling_features: linear,
            optimal_tiling_features: optimal,
            buffer_features: vk::FormatFeatureFlags::empty(),
        }
    }

    #[test]
    fn test_select_first_supported_candidate() {
        let depth = vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT;
        let mut queried = Vec::new();
        let format = select_supported_format(&DEPTH_FORMAT_CANDIDATES, vk::ImageTiling::OPTIMAL, depth, |f| {
            queried.push(f);
            if f == vk::Format::D32_SFLOAT {
                props(vk::FormatFeatureFlags::empty(), depth)
            } else {
                props(depth, vk::FormatFeatureFlags::empty())
            }
        })
        .unwrap();

        assert_eq!(format, vk::Format::D32_SFLOAT_S8_UINT);
        assert_eq!(queried, vec![vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT_S8_UINT]);
    }

    #[test]
    fn test_select_respects_linear_tiling() {
        let sampled = vk::FormatFeatureFlags::SAMPLED_IMAGE;
        let format = select_supported_format(&[vk::Format::R8G8B8A8_SRGB], vk::ImageTiling::LINEAR, sampled, |_| {
            props(vk::FormatFeatureFlags::empty(), sampled)
        })
        .unwrap();
        assert_eq!(format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn test_select_none_supported() {
        let result = select_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| props(vk::FormatFeatureFlags::empty(), vk::FormatFeatureFlags::empty()),
        );
        match result {
            Err(VulkanError::UnsupportedFormat { candidates }) => assert_eq!(candidates.len(), 3),
            other => panic!("expected UnsupportedFormat, got {:?}", other),
        }
    }

    #[test]
    fn test_write_memory_report() {
        let path = std::env::temp_dir().join(format!("sprite_engine_report_{}.txt", std::process::id()));
        write_memory_report(&path, "block 0: 256 bytes").unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert!(contents.starts_with(MEMORY_REPORT_HEADER));
        assert!(contents.contains("block 0: 256 bytes"));
    }

    #[test]
    fn test_write_memory_report_bad_path() {
        let path = Path::new("/nonexistent-directory/for/sure/report.txt");
        assert!(write_memory_report(path, "x").is_err());
    }
}
