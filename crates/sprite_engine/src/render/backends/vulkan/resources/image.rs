//! GPU images with tracked layouts
//!
//! An image's current layout is stored alongside it and changes only when a
//! transition has been recorded successfully. Three flavours exist: render
//! targets, textures decoded from files, and non-owning wrappers around
//! swapchain images.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::path::Path;
use std::sync::Arc;

use super::buffer::{GpuBuffer, MemoryClass};
use super::decoder::{decode_with_fallback, DecodedImage, ImageDecoder};
use super::format::aspect_for_format;
use super::image_view::ImageView;
use super::sampler::Sampler;
use super::transition::record_layout_barrier;
use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Format used for decoded textures
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

enum ImageOwnership {
    Owned(Allocation),
    // Owned by the presentation engine, never destroyed here
    Swapchain,
}

struct ImageStorage {
    device: Arc<GraphicsDevice>,
    image: vk::Image,
    ownership: ImageOwnership,
}

impl Drop for ImageStorage {
    fn drop(&mut self) {
        if let ImageOwnership::Owned(allocation) = std::mem::replace(&mut self.ownership, ImageOwnership::Swapchain) {
            unsafe {
                self.device.handle().destroy_image(self.image, None);
            }
            self.device.free(allocation);
        }
    }
}

/// Image, view, optional sampler, and the layout the image is currently in
pub struct GpuImage {
    // Field order matters: the view and sampler are destroyed before the image
    view: ImageView,
    sampler: Option<Sampler>,
    storage: ImageStorage,
    extent: vk::Extent2D,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
    layout: vk::ImageLayout,
}

impl GpuImage {
    /// Allocate a device-local image to render into
    pub fn render_target(
        device: Arc<GraphicsDevice>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<Self> {
        let storage = Self::allocate_storage(&device, name, extent, format, usage)?;
        let aspect = aspect_for_format(format);
        let view = ImageView::new(Arc::clone(&device), storage.image, format, aspect)?;

        Ok(Self {
            view,
            sampler: None,
            storage,
            extent,
            format,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Decode `path` and upload it as a sampled texture.
    ///
    /// Decode failures substitute `placeholder` instead of failing.
    pub fn from_file(
        device: Arc<GraphicsDevice>,
        decoder: &dyn ImageDecoder,
        path: &Path,
        placeholder: &Path,
    ) -> VulkanResult<Self> {
        let decoded = decode_with_fallback(decoder, path, placeholder);
        Self::from_pixels(device, &path.to_string_lossy(), &decoded)
    }

    /// Upload RGBA8 pixels as a sampled texture in `SHADER_READ_ONLY_OPTIMAL`
    pub fn from_pixels(device: Arc<GraphicsDevice>, name: &str, decoded: &DecodedImage) -> VulkanResult<Self> {
        let extent = vk::Extent2D {
            width: decoded.width,
            height: decoded.height,
        };
        let mut image = Self::render_target(
            Arc::clone(&device),
            name,
            extent,
            TEXTURE_FORMAT,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
        )?;
        image.upload(&decoded.pixels)?;
        image.sampler = Some(Sampler::linear_repeat(device)?);

        log::info!("Created texture '{}' ({}x{})", name, extent.width, extent.height);
        Ok(image)
    }

    /// Wrap an image owned by a swapchain. The image is never freed here.
    pub fn from_swapchain(
        device: Arc<GraphicsDevice>,
        image: vk::Image,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let aspect = aspect_for_format(format);
        let view = ImageView::new(Arc::clone(&device), image, format, aspect)?;

        Ok(Self {
            view,
            sampler: None,
            storage: ImageStorage {
                device,
                image,
                ownership: ImageOwnership::Swapchain,
            },
            extent,
            format,
            aspect,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    fn allocate_storage(
        device: &Arc<GraphicsDevice>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<ImageStorage> {
        if extent.width == 0 || extent.height == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: format!("image '{}' has zero extent", name),
            });
        }

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::TYPE_1);

        let vk_device = device.handle();
        let image = unsafe { vk_device.create_image(&create_info, None).map_err(VulkanError::Api)? };
        let requirements = unsafe { vk_device.get_image_memory_requirements(image) };

        let allocation = match device.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { vk_device.destroy_image(image, None) };
                return Err(e);
            }
        };

        if let Err(e) = unsafe { vk_device.bind_image_memory(image, allocation.memory(), allocation.offset()) } {
            unsafe { vk_device.destroy_image(image, None) };
            device.free(allocation);
            return Err(VulkanError::Api(e));
        }

        device.set_object_name(image, name);
        Ok(ImageStorage {
            device: Arc::clone(device),
            image,
            ownership: ImageOwnership::Owned(allocation),
        })
    }

    /// Copy `pixels` in through a staging buffer and leave the image shader-readable
    fn upload(&mut self, pixels: &[u8]) -> VulkanResult<()> {
        self.transition_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)?;

        let device = Arc::clone(&self.storage.device);
        let staging = GpuBuffer::with_data(
            Arc::clone(&device),
            "texture staging",
            pixels,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryClass::HostVisible,
        )?;

        device.execute_single_time(|cmd| {
            let region = vk::BufferImageCopy::builder()
                .buffer_offset(0)
                .buffer_row_length(0)
                .buffer_image_height(0)
                .image_subresource(vk::ImageSubresourceLayers {
                    aspect_mask: self.aspect,
                    mip_level: 0,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
                .image_extent(vk::Extent3D {
                    width: self.extent.width,
                    height: self.extent.height,
                    depth: 1,
                });
            unsafe {
                device.handle().cmd_copy_buffer_to_image(
                    cmd,
                    staging.handle(),
                    self.storage.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[region.build()],
                );
            }

            self.record_transition(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
        })
    }

    /// Record a barrier to `new_layout` into an open command buffer.
    ///
    /// The tracked layout changes only if the pair is supported.
    pub fn record_transition(&mut self, command_buffer: vk::CommandBuffer, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        record_layout_barrier(
            self.storage.device.handle(),
            command_buffer,
            self.storage.image,
            self.aspect,
            self.layout,
            new_layout,
        )?;
        self.layout = new_layout;
        Ok(())
    }

    /// Transition immediately in a single-time command. Setup only.
    pub fn transition_layout(&mut self, new_layout: vk::ImageLayout) -> VulkanResult<()> {
        if self.layout == new_layout {
            return Ok(());
        }
        let device = Arc::clone(&self.storage.device);
        let old_layout = self.layout;
        device.execute_single_time(|cmd| {
            record_layout_barrier(device.handle(), cmd, self.storage.image, self.aspect, old_layout, new_layout)
        })?;
        self.layout = new_layout;
        Ok(())
    }

    /// Image handle
    pub fn handle(&self) -> vk::Image {
        self.storage.image
    }

    /// View handle
    pub fn view(&self) -> vk::ImageView {
        self.view.handle()
    }

    /// Sampler handle, for sampled textures
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler.as_ref().map(Sampler::handle)
    }

    /// Pixel dimensions
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Pixel format
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Aspect derived from the format
    pub fn aspect(&self) -> vk::ImageAspectFlags {
        self.aspect
    }

    /// Layout as of the last recorded transition
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    /// Whether this wraps a swapchain-owned image
    pub fn is_swapchain_image(&self) -> bool {
        matches!(self.storage.ownership, ImageOwnership::Swapchain)
    }
}
