//! Image layout transition table
//!
//! Each supported (old, new) layout pair maps to the pipeline stages and
//! access masks its barrier needs. Pairs outside the table are rejected
//! instead of guessed.

use ash::vk;

use crate::render::backends::vulkan::{VulkanError, VulkanResult};

/// Stage and access masks for one layout transition barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionMasks {
    /// Stages that must finish before the transition
    pub src_stage: vk::PipelineStageFlags,
    /// Stages that wait on the transition
    pub dst_stage: vk::PipelineStageFlags,
    /// Writes made available by the barrier
    pub src_access: vk::AccessFlags,
    /// Accesses the barrier makes visible
    pub dst_access: vk::AccessFlags,
}

/// Look up the barrier masks for `old -> new`.
///
/// Returns `None` for pairs the renderer never performs.
pub fn transition_masks(old: vk::ImageLayout, new: vk::ImageLayout) -> Option<TransitionMasks> {
    use vk::AccessFlags as A;
    use vk::ImageLayout as L;
    use vk::PipelineStageFlags as S;

    let early_late_depth = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
    let depth_rw = A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE;

    let (src_stage, dst_stage, src_access, dst_access) = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => (S::TOP_OF_PIPE, S::TRANSFER, A::empty(), A::TRANSFER_WRITE),
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => {
            (S::TRANSFER, S::FRAGMENT_SHADER, A::TRANSFER_WRITE, A::SHADER_READ)
        }
        (L::UNDEFINED | L::PRESENT_SRC_KHR, L::COLOR_ATTACHMENT_OPTIMAL) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            S::COLOR_ATTACHMENT_OUTPUT,
            A::empty(),
            A::COLOR_ATTACHMENT_WRITE,
        ),
        (L::COLOR_ATTACHMENT_OPTIMAL, L::PRESENT_SRC_KHR) => (
            S::COLOR_ATTACHMENT_OUTPUT,
            S::BOTTOM_OF_PIPE,
            A::COLOR_ATTACHMENT_WRITE,
            A::empty(),
        ),
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            (S::TOP_OF_PIPE, early_late_depth, A::empty(), depth_rw)
        }
        (L::SHADER_READ_ONLY_OPTIMAL, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => {
            (S::FRAGMENT_SHADER, early_late_depth, A::SHADER_READ, depth_rw)
        }
        (L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => (
            early_late_depth,
            S::FRAGMENT_SHADER,
            A::DEPTH_STENCIL_ATTACHMENT_WRITE,
            A::SHADER_READ,
        ),
        _ => return None,
    };

    Some(TransitionMasks {
        src_stage,
        dst_stage,
        src_access,
        dst_access,
    })
}

/// Record a layout barrier for `image` into `command_buffer`.
///
/// Same-layout requests record nothing.
pub fn record_layout_barrier(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> VulkanResult<()> {
    if old == new {
        return Ok(());
    }

    let masks = transition_masks(old, new).ok_or(VulkanError::UnsupportedLayoutTransition { from: old, to: new })?;

    let barrier = vk::ImageMemoryBarrier::builder()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    unsafe {
        device.cmd_pipeline_barrier(
            command_buffer,
            masks.src_stage,
            masks.dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier.build()],
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions() {
        let to_dst = transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(to_dst.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_access, vk::AccessFlags::TRANSFER_WRITE);

        let to_read = transition_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(to_read.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(to_read.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_frame_color_transitions() {
        for old in [vk::ImageLayout::UNDEFINED, vk::ImageLayout::PRESENT_SRC_KHR] {
            let masks = transition_masks(old, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL).unwrap();
            assert_eq!(masks.dst_access, vk::AccessFlags::COLOR_ATTACHMENT_WRITE);
        }
        let present = transition_masks(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, vk::ImageLayout::PRESENT_SRC_KHR)
            .unwrap();
        assert_eq!(present.dst_stage, vk::PipelineStageFlags::BOTTOM_OF_PIPE);
    }

    #[test]
    fn test_frame_depth_transitions() {
        assert!(transition_masks(vk::ImageLayout::UNDEFINED, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).is_some());
        assert!(transition_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
        )
        .is_some());
        assert!(transition_masks(
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        )
        .is_some());
    }

    #[test]
    fn test_unsupported_pairs() {
        assert!(transition_masks(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL, vk::ImageLayout::TRANSFER_DST_OPTIMAL).is_none());
        assert!(transition_masks(vk::ImageLayout::PRESENT_SRC_KHR, vk::ImageLayout::UNDEFINED).is_none());
        assert!(transition_masks(vk::ImageLayout::GENERAL, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL).is_none());
    }
}
