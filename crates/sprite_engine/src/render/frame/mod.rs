//! Frame execution: the begin/end frame state machine and its Vulkan backend

pub mod scheduler;
pub mod vulkan_backend;

pub use scheduler::{wait_for_visible_extent, FrameBackend, FrameContext, FramePhase, FrameScheduler};
pub use vulkan_backend::VulkanFrameBackend;
