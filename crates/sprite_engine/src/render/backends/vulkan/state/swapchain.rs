//! Surface swapchain
//!
//! Owns the presentable images, one depth image per presentable image, and
//! the per-slot synchronization objects. Replacing a swapchain hands the old
//! one in as `previous`: its handle becomes the `old_swapchain` hint and its
//! sync objects and slot cursor carry over.

use ash::vk;
use std::sync::Arc;

use super::sync::{FrameSync, ImageFenceMap};
use crate::core::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::resources::GpuImage;
use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Result of asking for the next presentable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Image acquired and the swapchain matches the surface
    Success(u32),
    /// Image acquired, but the swapchain should be recreated after this frame
    Suboptimal(u32),
    /// No image; the swapchain must be recreated first
    OutOfDate,
}

/// Result of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Presented normally
    Presented,
    /// Presented, but the swapchain no longer matches the surface exactly
    Suboptimal,
    /// The surface changed; the swapchain must be recreated
    OutOfDate,
}

/// Preferred surface format, else the first one reported
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|sf| sf.format == vk::Format::B8G8R8A8_SRGB && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR)
        .or_else(|| formats.first())
        .copied()
}

/// Mailbox when available, otherwise FIFO (always supported)
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's extent, or `requested` clamped to its limits when the surface leaves it open
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Presentable image ring plus its depth images and frame-slot sync state
pub struct SurfaceSwapchain {
    device: Arc<GraphicsDevice>,
    swapchain: vk::SwapchainKHR,
    color_images: Vec<GpuImage>,
    depth_images: Vec<GpuImage>,
    frame_sync: Vec<FrameSync>,
    image_fences: ImageFenceMap<vk::Fence>,
    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    extent: vk::Extent2D,
    depth_format: vk::Format,
    current_slot: usize,
}

impl SurfaceSwapchain {
    /// Build a swapchain for `requested` pixels.
    ///
    /// `requested` must be non-zero in both dimensions. Passing the swapchain
    /// being replaced as `previous` lets the presentation engine hand over
    /// smoothly and keeps the frame-slot cursor in step.
    pub fn new(
        device: Arc<GraphicsDevice>,
        requested: vk::Extent2D,
        previous: Option<SurfaceSwapchain>,
    ) -> VulkanResult<Self> {
        assert!(
            requested.width > 0 && requested.height > 0,
            "swapchain requested with zero extent {}x{}",
            requested.width,
            requested.height
        );

        let physical = device.physical().device;
        let surface = device.surface();
        let surface_loader = device.surface_loader();

        let caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map_err(VulkanError::Api)?
        };

        let surface_format = choose_surface_format(&formats)
            .ok_or_else(|| VulkanError::InitializationFailed("Surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&modes);
        let extent = choose_extent(&caps, requested);
        let image_count = choose_image_count(&caps);
        let depth_format = device.find_depth_format()?;

        let (previous, frame_sync, current_slot) = match previous {
            Some(mut old) => {
                let sync = std::mem::take(&mut old.frame_sync);
                let slot = old.current_slot;
                (Some(old), sync, slot)
            }
            None => (None, Vec::new(), 0),
        };
        let old_handle = previous.as_ref().map_or(vk::SwapchainKHR::null(), |old| old.swapchain);

        let families = [device.physical().graphics_family, device.physical().present_family];
        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_handle);
        create_info = if families[0] != families[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = device.swapchain_loader();
        let swapchain = unsafe { loader.create_swapchain(&create_info, None).map_err(VulkanError::Api)? };
        // Retired swapchain can go once its replacement exists
        drop(previous);

        let mut this = Self {
            device: Arc::clone(&device),
            swapchain,
            color_images: Vec::new(),
            depth_images: Vec::new(),
            frame_sync,
            image_fences: ImageFenceMap::new(0),
            surface_format,
            present_mode,
            extent,
            depth_format,
            current_slot,
        };

        let images = unsafe { loader.get_swapchain_images(swapchain).map_err(VulkanError::Api)? };
        for (i, &image) in images.iter().enumerate() {
            device.set_object_name(image, &format!("Swapchain Image {}", i));
            this.color_images.push(GpuImage::from_swapchain(
                Arc::clone(&device),
                image,
                surface_format.format,
                extent,
            )?);
            this.depth_images.push(GpuImage::render_target(
                Arc::clone(&device),
                &format!("Depth Image {}", i),
                extent,
                depth_format,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
            )?);
        }
        this.image_fences = ImageFenceMap::new(images.len());

        while this.frame_sync.len() < MAX_FRAMES_IN_FLIGHT {
            this.frame_sync.push(FrameSync::new(Arc::clone(&device))?);
        }

        log::info!(
            "Created swapchain {}x{} with {} images ({:?}, {:?})",
            extent.width,
            extent.height,
            images.len(),
            surface_format.format,
            present_mode
        );
        Ok(this)
    }

    /// Wait for the current slot's fence, then acquire the next image.
    ///
    /// The acquired image signals the slot's image-available semaphore.
    pub fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome> {
        let sync = &self.frame_sync[self.current_slot];
        sync.in_flight.wait(u64::MAX)?;

        let result = unsafe {
            self.device.swapchain_loader().acquire_next_image(
                self.swapchain,
                u64::MAX,
                sync.image_available.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(AcquireOutcome::Success(index)),
            Ok((index, true)) => Ok(AcquireOutcome::Suboptimal(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date at acquire");
                Ok(AcquireOutcome::OutOfDate)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Submit `command_buffer` for `image_index` and queue the image for presentation.
    ///
    /// Waits on whichever other slot's fence last used the image, re-arms the
    /// current slot's fence, then advances the slot cursor.
    pub fn submit_and_present(
        &mut self,
        command_buffer: vk::CommandBuffer,
        image_index: u32,
    ) -> VulkanResult<PresentOutcome> {
        let vk_device = self.device.handle();
        let sync = &self.frame_sync[self.current_slot];
        let fence = sync.in_flight.handle();

        if let Some(owner) = self.image_fences.claim(image_index as usize, fence) {
            unsafe {
                vk_device
                    .wait_for_fences(&[owner], true, u64::MAX)
                    .map_err(VulkanError::Api)?;
            }
        }

        let wait_semaphores = [sync.image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [sync.render_finished.handle()];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        sync.in_flight.reset()?;
        unsafe {
            vk_device
                .queue_submit(self.device.graphics_queue(), &[submit_info.build()], fence)
                .map_err(VulkanError::Api)?;
        }

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.device
                .swapchain_loader()
                .queue_present(self.device.present_queue(), &present_info)
        };

        self.current_slot = (self.current_slot + 1) % MAX_FRAMES_IN_FLIGHT;

        match result {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("Swapchain out of date at present");
                Ok(PresentOutcome::OutOfDate)
            }
            Err(e) => Err(VulkanError::Api(e)),
        }
    }

    /// Swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    /// Image size in pixels
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Color format and space of the presentable images
    pub fn surface_format(&self) -> vk::SurfaceFormatKHR {
        self.surface_format
    }

    /// Present mode in use
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    /// Format of the depth images
    pub fn depth_format(&self) -> vk::Format {
        self.depth_format
    }

    /// Number of presentable images
    pub fn image_count(&self) -> usize {
        self.color_images.len()
    }

    /// Frame slot the next acquire will use
    pub fn current_slot(&self) -> usize {
        self.current_slot
    }

    /// Start the frame-slot cursor at `slot` on a swapchain no frame has used yet
    pub fn resume_at_slot(&mut self, slot: usize) {
        assert!(slot < MAX_FRAMES_IN_FLIGHT, "frame slot {} out of range", slot);
        self.current_slot = slot;
    }

    /// Presentable image and its matching depth image
    pub fn attachments_mut(&mut self, image_index: u32) -> (&mut GpuImage, &mut GpuImage) {
        let index = image_index as usize;
        (&mut self.color_images[index], &mut self.depth_images[index])
    }
}

impl Drop for SurfaceSwapchain {
    fn drop(&mut self) {
        // Views of swapchain images must go before the swapchain itself
        self.color_images.clear();
        self.depth_images.clear();
        unsafe {
            self.device.swapchain_loader().destroy_swapchain(self.swapchain, None);
        }
    }
}
