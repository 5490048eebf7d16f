//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Semaphores order work on the GPU (image acquired before color output,
//! color output before present). Fences let the CPU know when a frame slot's
//! resources are free again.

use ash::vk;
use std::sync::Arc;

use crate::render::backends::vulkan::{GraphicsDevice, VulkanError, VulkanResult};

/// GPU-GPU synchronization primitive with automatic resource management
pub struct Semaphore {
    device: Arc<GraphicsDevice>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Arc<GraphicsDevice>) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Arc<GraphicsDevice>,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Arc<GraphicsDevice>, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .handle()
                .create_fence(&create_info, None)
                .map_err(VulkanError::Api)?
        };

        Ok(Self { device, fence })
    }

    /// Block until the fence is signalled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Return the fence to the unsignalled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Frame synchronization objects for in-flight frame management
pub struct FrameSync {
    /// Semaphore signaled when swapchain image becomes available
    pub image_available: Semaphore,
    /// Semaphore signaled when frame rendering is complete
    pub render_finished: Semaphore,
    /// Fence for CPU-GPU synchronization of frame. Created signalled so the
    /// first wait on a fresh slot returns immediately.
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects
    pub fn new(device: Arc<GraphicsDevice>) -> VulkanResult<Self> {
        let image_available = Semaphore::new(Arc::clone(&device))?;
        let render_finished = Semaphore::new(Arc::clone(&device))?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}

/// Which fence last claimed each swapchain image.
///
/// With more swapchain images than frame slots, an acquired image may still be
/// in use by a different slot's submission; that fence has to be waited on
/// before the image is reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFenceMap<F> {
    owners: Vec<Option<F>>,
}

impl<F: Copy + PartialEq> ImageFenceMap<F> {
    /// Map for `image_count` images, none owned
    pub fn new(image_count: usize) -> Self {
        Self {
            owners: vec![None; image_count],
        }
    }

    /// Record `fence` as the owner of `image`.
    ///
    /// Returns the previous owner when it is a different fence; the caller
    /// must wait on it before submitting.
    pub fn claim(&mut self, image: usize, fence: F) -> Option<F> {
        let previous = self.owners[image].replace(fence);
        previous.filter(|&owner| owner != fence)
    }

    /// Current owner of `image`
    pub fn owner(&self, image: usize) -> Option<F> {
        self.owners[image]
    }

    /// Number of tracked images
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    /// Whether no images are tracked
    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_claim_has_no_previous_owner() {
        let mut map = ImageFenceMap::new(3);
        assert_eq!(map.claim(0, 10u64), None);
        assert_eq!(map.owner(0), Some(10));
        assert_eq!(map.owner(1), None);
    }

    #[test]
    fn test_claim_by_other_slot_returns_owner() {
        let mut map = ImageFenceMap::new(3);
        map.claim(2, 10u64);
        assert_eq!(map.claim(2, 20), Some(10));
        assert_eq!(map.owner(2), Some(20));
    }

    #[test]
    fn test_reclaim_by_same_fence_needs_no_wait() {
        let mut map = ImageFenceMap::new(2);
        map.claim(1, 7u64);
        assert_eq!(map.claim(1, 7), None);
    }

    #[test]
    fn test_three_images_two_slots() {
        // slots alternate fences A and B while images rotate 0, 1, 2
        let (a, b) = (1u64, 2u64);
        let mut map = ImageFenceMap::new(3);
        assert_eq!(map.claim(0, a), None);
        assert_eq!(map.claim(1, b), None);
        assert_eq!(map.claim(2, a), None);
        assert_eq!(map.claim(0, b), Some(a));
        assert_eq!(map.claim(1, a), Some(b));
        assert_eq!(map.len(), 3);
    }
}
