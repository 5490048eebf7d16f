//! Format classification

use ash::vk;

/// Image aspect implied by a format.
///
/// Depth-only and depth/stencil formats are listed explicitly; every other
/// format is treated as color.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::X8_D24_UNORM_PACK32 | vk::Format::D32_SFLOAT => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Whether the format carries a depth component
pub fn is_depth_format(format: vk::Format) -> bool {
    aspect_for_format(format).contains(vk::ImageAspectFlags::DEPTH)
}
