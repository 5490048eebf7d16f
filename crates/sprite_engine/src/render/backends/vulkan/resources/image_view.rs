//! Image view wrapper

use ash::vk;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// 2D image view with RAII cleanup
pub struct ImageView {
    device: Arc<GraphicsDevice>,
    view: vk::ImageView,
}

impl ImageView {
    /// Create a single-mip, single-layer 2D view of `image`
    pub fn new(
        device: Arc<GraphicsDevice>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let view = unsafe {
            device
                .handle()
                .create_image_view(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, view })
    }

    /// View handle
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
        }
    }
}
