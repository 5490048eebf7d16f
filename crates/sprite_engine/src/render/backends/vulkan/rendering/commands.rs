//! Per-frame command buffers

use ash::vk;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// One primary command buffer per frame slot, re-recorded every frame
pub struct FrameCommandBuffers {
    device: Arc<GraphicsDevice>,
    buffers: Vec<vk::CommandBuffer>,
}

impl FrameCommandBuffers {
    /// Allocate `count` command buffers from the device pool
    pub fn new(device: Arc<GraphicsDevice>, count: usize) -> VulkanResult<Self> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool())
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        let buffers = unsafe {
            device
                .handle()
                .allocate_command_buffers(&alloc_info)
                .map_err(VulkanError::Api)?
        };

        for (i, &buffer) in buffers.iter().enumerate() {
            device.set_object_name(buffer, &format!("CommandBuffer: {}", i));
        }

        Ok(Self { device, buffers })
    }

    /// Command buffer for `slot`
    pub fn get(&self, slot: usize) -> vk::CommandBuffer {
        self.buffers[slot]
    }

    /// Number of buffers
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no buffers were allocated
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    /// Reset and begin recording `slot`'s buffer.
    ///
    /// Only call once the slot's fence has signalled.
    pub fn begin(&self, slot: usize) -> VulkanResult<vk::CommandBuffer> {
        let command_buffer = self.get(slot);
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            let device = self.device.handle();
            device
                .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)?;
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .map_err(VulkanError::Api)?;
        }
        Ok(command_buffer)
    }

    /// Finish recording `slot`'s buffer
    pub fn end(&self, slot: usize) -> VulkanResult<()> {
        unsafe {
            self.device
                .handle()
                .end_command_buffer(self.get(slot))
                .map_err(VulkanError::Api)
        }
    }
}

impl Drop for FrameCommandBuffers {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .free_command_buffers(self.device.command_pool(), &self.buffers);
        }
    }
}
