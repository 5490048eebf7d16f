//! Window integration: collaborator traits and the GLFW implementation

pub(crate) mod backend;
mod glfw_window;

pub use backend::{SurfaceProvider, WindowSurface};
pub use glfw_window::{Window, WindowError, WindowResult};
