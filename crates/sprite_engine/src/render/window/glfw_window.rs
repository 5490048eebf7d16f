//! Window management using GLFW
//!
//! Provides cross-platform window creation and event handling for Vulkan

use super::backend::{SurfaceProvider, WindowSurface};
use crate::core::WindowConfig;
use ash::vk;
use thiserror::Error;

/// Window management errors
#[derive(Error, Debug)]
pub enum WindowError {
    /// GLFW could not be initialized
    #[error("GLFW initialization failed")]
    InitializationFailed,

    /// The window could not be created
    #[error("Window creation failed")]
    CreationFailed,

    /// Any other GLFW failure
    #[error("GLFW error: {0}")]
    GlfwError(String),
}

/// Result type for window operations
pub type WindowResult<T> = Result<T, WindowError>;

/// GLFW window wrapper with proper resource management
pub struct Window {
    glfw: glfw::Glfw,
    window: glfw::PWindow,
    events: glfw::GlfwReceiver<(f64, glfw::WindowEvent)>,
    framebuffer_resized: bool,
    pending_keys: Vec<(glfw::Key, glfw::Action)>,
}

impl Window {
    /// Open a resizable window without a client API
    pub fn new(title: &str, width: u32, height: u32) -> WindowResult<Self> {
        let mut glfw = glfw::init(glfw::fail_on_errors).map_err(|_| WindowError::InitializationFailed)?;

        if !glfw.vulkan_supported() {
            return Err(WindowError::GlfwError("Vulkan is not supported by GLFW on this system".to_string()));
        }

        glfw.window_hint(glfw::WindowHint::ClientApi(glfw::ClientApiHint::NoApi));
        glfw.window_hint(glfw::WindowHint::Resizable(true));

        let (mut window, events) = glfw
            .create_window(width, height, title, glfw::WindowMode::Windowed)
            .ok_or(WindowError::CreationFailed)?;

        window.set_key_polling(true);
        window.set_close_polling(true);
        window.set_framebuffer_size_polling(true);

        log::info!("Created {}x{} window \"{}\"", width, height, title);

        Ok(Self {
            glfw,
            window,
            events,
            framebuffer_resized: false,
            pending_keys: Vec::new(),
        })
    }

    /// Open a window from configuration
    pub fn from_config(config: &WindowConfig) -> WindowResult<Self> {
        Self::new(&config.title, config.width, config.height)
    }

    /// Whether the user asked to close the window
    pub fn should_close(&self) -> bool {
        self.window.should_close()
    }

    /// Request or cancel window closure
    pub fn set_should_close(&mut self, should_close: bool) {
        self.window.set_should_close(should_close);
    }

    /// Process pending events without blocking
    pub fn poll_events(&mut self) {
        self.glfw.poll_events();
        self.drain_events();
    }

    /// Key events received since the last call
    pub fn take_key_events(&mut self) -> Vec<(glfw::Key, glfw::Action)> {
        std::mem::take(&mut self.pending_keys)
    }

    fn drain_events(&mut self) {
        for (_, event) in glfw::flush_messages(&self.events) {
            match event {
                glfw::WindowEvent::FramebufferSize(width, height) => {
                    log::debug!("Framebuffer resized to {}x{}", width, height);
                    self.framebuffer_resized = true;
                }
                glfw::WindowEvent::Key(key, _, action, _) => self.pending_keys.push((key, action)),
                _ => {}
            }
        }
    }
}

impl WindowSurface for Window {
    fn framebuffer_extent(&self) -> (u32, u32) {
        let (width, height) = self.window.get_framebuffer_size();
        (width.max(0) as u32, height.max(0) as u32)
    }

    fn resize_requested(&self) -> bool {
        self.framebuffer_resized
    }

    fn take_resize_request(&mut self) -> bool {
        std::mem::replace(&mut self.framebuffer_resized, false)
    }

    fn wait_events(&mut self) {
        self.glfw.wait_events();
        self.drain_events();
    }
}

impl SurfaceProvider for Window {
    fn required_instance_extensions(&self) -> Result<Vec<String>, String> {
        self.glfw
            .get_required_instance_extensions()
            .ok_or_else(|| "GLFW reported no Vulkan instance extensions".to_string())
    }

    fn create_surface(&self, instance: vk::Instance) -> Result<vk::SurfaceKHR, String> {
        let mut surface = vk::SurfaceKHR::null();
        let result = self.window.create_window_surface(instance, std::ptr::null(), &mut surface);

        if result == vk::Result::SUCCESS {
            Ok(surface)
        } else {
            Err(format!("Failed to create Vulkan surface: {:?}", result))
        }
    }
}
