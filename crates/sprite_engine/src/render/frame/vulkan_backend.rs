//! Swapchain-backed frame backend
//!
//! Passes use dynamic rendering straight onto the acquired swapchain image and
//! its depth image, so there are no render pass or framebuffer objects to
//! rebuild on resize.

use ash::vk;
use std::sync::Arc;

use super::scheduler::FrameBackend;
use crate::core::MAX_FRAMES_IN_FLIGHT;
use crate::render::backends::vulkan::{
    AcquireOutcome, FrameCommandBuffers, GraphicsDevice, PresentOutcome, SurfaceSwapchain, VulkanError, VulkanResult,
};

/// Swapchain, per-slot command buffers, and the pass clear color
pub struct VulkanFrameBackend {
    // Command buffers go before the swapchain whose images they reference
    commands: FrameCommandBuffers,
    swapchain: Option<SurfaceSwapchain>,
    clear_color: [f32; 4],
    device: Arc<GraphicsDevice>,
}

impl VulkanFrameBackend {
    /// Create the swapchain at `extent` and one command buffer per frame slot
    pub fn new(device: Arc<GraphicsDevice>, extent: vk::Extent2D, clear_color: [f32; 4]) -> VulkanResult<Self> {
        let swapchain = SurfaceSwapchain::new(Arc::clone(&device), extent, None)?;
        let commands = FrameCommandBuffers::new(Arc::clone(&device), MAX_FRAMES_IN_FLIGHT)?;

        Ok(Self {
            commands,
            swapchain: Some(swapchain),
            clear_color,
            device,
        })
    }

    /// Color format of the presentable images
    pub fn color_format(&self) -> vk::Format {
        self.swapchain
            .as_ref()
            .map_or(vk::Format::UNDEFINED, |swapchain| swapchain.surface_format().format)
    }

    /// Format of the depth attachments
    pub fn depth_format(&self) -> vk::Format {
        self.swapchain
            .as_ref()
            .map_or(vk::Format::UNDEFINED, SurfaceSwapchain::depth_format)
    }

    fn swapchain_mut(swapchain: &mut Option<SurfaceSwapchain>) -> VulkanResult<&mut SurfaceSwapchain> {
        swapchain.as_mut().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "swapchain is missing after a failed recreation".to_string(),
        })
    }
}

impl FrameBackend for VulkanFrameBackend {
    fn acquire_next_image(&mut self) -> VulkanResult<AcquireOutcome> {
        Self::swapchain_mut(&mut self.swapchain)?.acquire_next_image()
    }

    fn begin_commands(&mut self, slot: usize) -> VulkanResult<vk::CommandBuffer> {
        self.commands.begin(slot)
    }

    fn end_commands(&mut self, slot: usize) -> VulkanResult<()> {
        self.commands.end(slot)
    }

    fn begin_rendering(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let cmd = self.commands.get(slot);
        let swapchain = Self::swapchain_mut(&mut self.swapchain)?;
        let extent = swapchain.extent();
        let (color, depth) = swapchain.attachments_mut(image_index);

        self.device.begin_label(cmd, "RenderPass");
        color.record_transition(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)?;
        depth.record_transition(cmd, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)?;

        let color_attachments = [vk::RenderingAttachmentInfo::builder()
            .image_view(color.view())
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color,
                },
            })
            .build()];
        let depth_attachment = vk::RenderingAttachmentInfo::builder()
            .image_view(depth.view())
            .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            });

        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let rendering_info = vk::RenderingInfo::builder()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };

        unsafe {
            self.device.dynamic_rendering().cmd_begin_rendering(cmd, &rendering_info);
            let vk_device = self.device.handle();
            vk_device.cmd_set_viewport(cmd, 0, &[viewport]);
            vk_device.cmd_set_scissor(cmd, 0, &[render_area]);
        }
        Ok(())
    }

    fn end_rendering(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let cmd = self.commands.get(slot);
        unsafe {
            self.device.dynamic_rendering().cmd_end_rendering(cmd);
        }

        let (color, depth) = Self::swapchain_mut(&mut self.swapchain)?.attachments_mut(image_index);
        color.record_transition(cmd, vk::ImageLayout::PRESENT_SRC_KHR)?;
        depth.record_transition(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;
        self.device.end_label(cmd);
        Ok(())
    }

    fn submit_and_present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
        let cmd = self.commands.get(slot);
        let swapchain = Self::swapchain_mut(&mut self.swapchain)?;
        debug_assert_eq!(slot, swapchain.current_slot(), "frame slot cursors out of step");
        swapchain.submit_and_present(cmd, image_index)
    }

    fn recreate(&mut self, extent: vk::Extent2D) -> VulkanResult<()> {
        self.device.wait_idle()?;
        log::debug!("Recreating swapchain at {}x{}", extent.width, extent.height);

        let previous = self.swapchain.take();
        let old_format = previous.as_ref().map(|swapchain| swapchain.surface_format().format);
        let swapchain = SurfaceSwapchain::new(Arc::clone(&self.device), extent, previous)?;
        if old_format.is_some_and(|format| format != swapchain.surface_format().format) {
            log::warn!(
                "Swapchain format changed to {:?}; pipelines built for the old format may misbehave",
                swapchain.surface_format().format
            );
        }
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn discard_frame(&mut self, slot: usize, extent: vk::Extent2D) -> VulkanResult<()> {
        self.device.wait_idle()?;
        log::debug!("Rebuilding swapchain at {}x{} after a discarded frame", extent.width, extent.height);

        // Destroying the swapchain releases the acquired image; new sync objects
        // replace an unwaited semaphore and a fence possibly reset without a submit
        self.swapchain = None;
        let mut swapchain = SurfaceSwapchain::new(Arc::clone(&self.device), extent, None)?;
        swapchain.resume_at_slot(slot);
        self.swapchain = Some(swapchain);
        Ok(())
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(vk::Extent2D::default(), SurfaceSwapchain::extent)
    }
}
