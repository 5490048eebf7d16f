//! # Sprite Engine
//!
//! A Vulkan frame-execution engine with a 2D sprite batch renderer.
//!
//! ## Features
//!
//! - **Frames in flight**: two frame slots fenced against GPU completion
//! - **Swapchain recreation**: on resize, staleness, or suboptimal presentation
//! - **Explicit GPU memory**: allocator-backed buffers and images with RAII cleanup
//! - **Sprite batching**: FIFO draw queue over one shared quad and pipeline
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sprite_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut window = Window::new("Sprites", 800, 600)?;
//!     let mut renderer = SpriteBatchRenderer::new(&mut window, &RendererConfig::default())?;
//!     let texture = renderer.create_texture("resources/TextureNotFound.png")?;
//!
//!     while !window.should_close() {
//!         window.poll_events();
//!         renderer.draw_texture(texture, Rect::ZERO, Rect::new(0.0, 0.0, 64.0, 64.0), 0.0, Color::WHITE);
//!         renderer.render(&mut window)?;
//!     }
//!     renderer.wait_idle()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::{Config, DescriptorQuotas, RendererConfig, ShaderConfig, WindowConfig, MAX_FRAMES_IN_FLIGHT},
        foundation::math::{Color, Rect, Vec2, Vec4},
        render::backends::vulkan::{VulkanError, VulkanResult},
        render::sprite::{SpriteBatchRenderer, TextureHandle},
        render::window::{Window, WindowError, WindowSurface},
    };
}
