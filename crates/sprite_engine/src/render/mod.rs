//! # Rendering System
//!
//! A single-threaded frame pipeline for 2D sprites on Vulkan.
//!
//! ## Architecture
//!
//! - **Window**: collaborator traits plus the GLFW implementation
//! - **Vulkan Backend**: device, memory-backed resources, descriptors, swapchain
//! - **Frame**: the begin/end frame state machine and swapchain recreation
//! - **Sprite**: texture handles, the draw queue, and the batch renderer
//!
//! Application code queues draws with [`SpriteBatchRenderer::draw_texture`]
//! and calls [`SpriteBatchRenderer::render`] once per loop iteration.

pub mod window;

/// Graphics backend implementations
pub mod backends;

pub mod frame;
pub mod sprite;

pub use frame::{FrameScheduler, VulkanFrameBackend};
pub use sprite::{SpriteBatchRenderer, TextureHandle};
pub use window::{SurfaceProvider, Window, WindowSurface};
