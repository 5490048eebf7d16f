//! Texture sampler wrapper

use ash::vk;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// Sampler with RAII cleanup
pub struct Sampler {
    device: Arc<GraphicsDevice>,
    sampler: vk::Sampler,
}

impl Sampler {
    /// Linear filtering, repeat addressing, anisotropic where the device allows
    pub fn linear_repeat(device: Arc<GraphicsDevice>) -> VulkanResult<Self> {
        let max_anisotropy = device.max_sampler_anisotropy();
        let create_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(max_anisotropy > 1.0)
            .max_anisotropy(max_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe {
            device
                .handle()
                .create_sampler(&create_info, None)
                .map_err(|e| VulkanError::InitializationFailed(format!("Failed to create sampler: {:?}", e)))?
        };

        Ok(Self { device, sampler })
    }

    /// Sampler handle
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_sampler(self.sampler, None);
        }
    }
}
