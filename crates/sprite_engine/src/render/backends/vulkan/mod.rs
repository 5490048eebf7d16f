//! Vulkan backend
//!
//! Device and instance setup, memory-backed resources, descriptor management,
//! pipelines, and swapchain synchronization.

pub mod descriptors;
pub mod initialization;
pub mod rendering;
pub mod resources;
pub mod state;

pub use initialization::{GraphicsDevice, PhysicalDeviceInfo, VulkanError, VulkanInstance, VulkanResult};
pub use rendering::{FrameCommandBuffers, GraphicsPipeline, PipelineDescription, PipelineLayout, ShaderModule};
pub use resources::{GpuBuffer, GpuImage, MemoryClass};
pub use state::{AcquireOutcome, PresentOutcome, SurfaceSwapchain};
