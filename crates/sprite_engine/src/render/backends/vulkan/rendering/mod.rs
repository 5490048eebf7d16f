// Vulkan rendering components

pub mod commands;
pub mod shader;

pub use commands::*;
pub use shader::*;
