//! Window collaborator traits
//!
//! The frame pipeline only needs a handful of things from the windowing
//! system. Splitting them into traits keeps the scheduler testable without a
//! display and keeps GLFW types out of the renderer.

use ash::vk;

/// What the frame scheduler needs from a window.
pub trait WindowSurface {
    /// Current framebuffer size in pixels. Either dimension is zero while
    /// the window is minimized.
    fn framebuffer_extent(&self) -> (u32, u32);

    /// Whether a resize was observed since the flag was last consumed
    fn resize_requested(&self) -> bool;

    /// Consume and clear the resize flag, returning its previous value
    fn take_resize_request(&mut self) -> bool;

    /// Block until at least one window event arrives, then process it
    fn wait_events(&mut self);
}

/// What the device needs to create a presentation surface.
pub trait SurfaceProvider {
    /// Instance extensions the platform requires for presentation
    fn required_instance_extensions(&self) -> Result<Vec<String>, String>;

    /// Create a surface for `instance`. The caller owns and destroys it.
    fn create_surface(&self, instance: vk::Instance) -> Result<vk::SurfaceKHR, String>;
}
