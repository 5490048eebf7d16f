//! # Renderer Configuration
//!
//! Settings for the sprite renderer, its shaders, descriptor quotas, and the
//! window it presents to. All types serialize through the [`Config`] trait so
//! they can live in TOML or RON files next to the application.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub use crate::config::{Config, ConfigError};

/// Number of frames the CPU may record ahead of the GPU.
///
/// Fixed at two; per-slot resources (command buffers, fences, uniforms) are
/// sized from this constant.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// # Shader Configuration
///
/// Locations of the precompiled SPIR-V shaders for the sprite pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderConfig {
    /// Path to the vertex shader SPIR-V file
    pub vertex_shader_path: String,
    /// Path to the fragment shader SPIR-V file
    pub fragment_shader_path: String,
}

impl ShaderConfig {
    /// Create a new shader configuration
    pub fn new(vertex_path: impl Into<String>, fragment_path: impl Into<String>) -> Self {
        Self {
            vertex_shader_path: vertex_path.into(),
            fragment_shader_path: fragment_path.into(),
        }
    }

    /// Create shader config with automatic path resolution
    ///
    /// Searches the usual output directories so the demo works whether it is
    /// launched from the workspace root or from its own crate directory.
    pub fn with_path_resolution(base_vertex: &str, base_fragment: &str) -> Self {
        const SHADER_DIRS: [&str; 5] = [
            "target/shaders/",
            "../target/shaders/",
            "shaders/",
            "resources/shaders/",
            "./",
        ];

        let resolve = |name: &str| {
            SHADER_DIRS
                .iter()
                .map(|dir| format!("{}{}", dir, name))
                .find(|candidate| Path::new(candidate).exists())
                .unwrap_or_else(|| format!("target/shaders/{}", name))
        };

        Self {
            vertex_shader_path: resolve(base_vertex),
            fragment_shader_path: resolve(base_fragment),
        }
    }

    /// Validate that shader files exist
    pub fn validate(&self) -> Result<(), String> {
        if !Path::new(&self.vertex_shader_path).exists() {
            return Err(format!("Vertex shader not found: {}", self.vertex_shader_path));
        }
        if !Path::new(&self.fragment_shader_path).exists() {
            return Err(format!("Fragment shader not found: {}", self.fragment_shader_path));
        }
        Ok(())
    }
}

impl Default for ShaderConfig {
    fn default() -> Self {
        Self::with_path_resolution("sprite.vert.spv", "sprite.frag.spv")
    }
}

/// Upfront descriptor pool quotas. The pool never grows past these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorQuotas {
    /// Maximum descriptor sets allocated from the pool
    pub max_sets: u32,
    /// Combined image sampler descriptors (one per texture)
    pub combined_image_samplers: u32,
    /// Uniform buffer descriptors (one per frame slot)
    pub uniform_buffers: u32,
}

impl Default for DescriptorQuotas {
    fn default() -> Self {
        Self {
            max_sets: 200,
            combined_image_samplers: 200,
            uniform_buffers: 4,
        }
    }
}

/// Window creation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial client width in screen coordinates
    pub width: u32,
    /// Initial client height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "Sprite Engine".to_string(),
            width: 1200,
            height: 1000,
        }
    }
}

impl Config for WindowConfig {}

/// # Renderer Configuration
///
/// Everything the sprite renderer needs that is not derived from the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RendererConfig {
    /// Application name for Vulkan instance creation
    pub application_name: String,
    /// Shader configuration
    pub shaders: ShaderConfig,
    /// Image substituted when a texture file cannot be decoded
    pub placeholder_texture: PathBuf,
    /// Where the allocator report is written at device teardown
    pub memory_report_path: PathBuf,
    /// Color attachment clear value (RGBA)
    pub clear_color: [f32; 4],
    /// Whether to enable Vulkan validation layers; `None` follows the build type
    pub enable_validation: Option<bool>,
    /// Descriptor pool quotas
    pub descriptor_quotas: DescriptorQuotas,
}

impl RendererConfig {
    /// Create a new renderer configuration
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            application_name: app_name.into(),
            shaders: ShaderConfig::default(),
            placeholder_texture: PathBuf::from("resources/TextureNotFound.png"),
            memory_report_path: PathBuf::from("gpu_memory_report.txt"),
            clear_color: [0.01, 0.01, 0.01, 1.0],
            enable_validation: None,
            descriptor_quotas: DescriptorQuotas::default(),
        }
    }

    /// Set custom shader configuration
    pub fn with_shaders(mut self, shaders: ShaderConfig) -> Self {
        self.shaders = shaders;
        self
    }

    /// Set the placeholder texture path
    pub fn with_placeholder_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.placeholder_texture = path.into();
        self
    }

    /// Set the memory report path
    pub fn with_memory_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.memory_report_path = path.into();
        self
    }

    /// Set the clear color
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = color;
        self
    }

    /// Enable or disable validation layers
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.enable_validation = Some(enabled);
        self
    }

    /// Set descriptor pool quotas
    pub fn with_descriptor_quotas(mut self, quotas: DescriptorQuotas) -> Self {
        self.descriptor_quotas = quotas;
        self
    }

    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.application_name.is_empty() {
            return Err("Application name cannot be empty".to_string());
        }

        let quotas = &self.descriptor_quotas;
        if quotas.max_sets == 0 {
            return Err("Descriptor pool must allow at least one set".to_string());
        }
        // set 0 needs one uniform descriptor per frame slot
        if (quotas.uniform_buffers as usize) < MAX_FRAMES_IN_FLIGHT {
            return Err(format!(
                "Descriptor pool needs at least {} uniform buffers, got {}",
                MAX_FRAMES_IN_FLIGHT, quotas.uniform_buffers
            ));
        }

        if self.clear_color.iter().any(|c| !(0.0..=1.0).contains(c)) {
            return Err("Clear color components must be within 0.0..=1.0".to_string());
        }

        self.shaders.validate()
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self::new("Sprite Engine Application")
    }
}

impl Config for RendererConfig {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigFormat;

    fn config_with_existing_shaders() -> RendererConfig {
        // Cargo.toml always exists in the crate directory tests run from
        RendererConfig::default().with_shaders(ShaderConfig::new("Cargo.toml", "Cargo.toml"))
    }

    #[test]
    fn test_defaults() {
        let config = RendererConfig::default();
        assert_eq!(config.placeholder_texture, PathBuf::from("resources/TextureNotFound.png"));
        assert_eq!(config.clear_color, [0.01, 0.01, 0.01, 1.0]);
        assert_eq!(config.descriptor_quotas.max_sets, 200);
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }

    #[test]
    fn test_validate_accepts_defaults_with_shaders_present() {
        assert!(config_with_existing_shaders().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_small_uniform_quota() {
        let config = config_with_existing_shaders().with_descriptor_quotas(DescriptorQuotas {
            uniform_buffers: 1,
            ..DescriptorQuotas::default()
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_missing_shader() {
        let config = RendererConfig::default()
            .with_shaders(ShaderConfig::new("missing.vert.spv", "missing.frag.spv"));
        let err = config.validate().unwrap_err();
        assert!(err.contains("Vertex shader not found"));
    }

    #[test]
    fn test_validation_override() {
        assert!(RendererConfig::default().with_validation(true).validation_enabled());
        assert!(!RendererConfig::default().with_validation(false).validation_enabled());
    }

    #[test]
    fn test_round_trip_toml() {
        let config = RendererConfig::new("demo")
            .with_clear_color([0.2, 0.3, 0.4, 1.0])
            .with_memory_report_path("report.txt");
        let text = config.to_string_with(ConfigFormat::Toml).unwrap();
        let parsed = RendererConfig::from_str_with(&text, ConfigFormat::Toml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_window_config_from_ron() {
        let window = WindowConfig::from_str_with(
            "(title: \"Sprites\", width: 800, height: 600)",
            ConfigFormat::Ron,
        )
        .unwrap();
        assert_eq!(window.width, 800);
        assert_eq!(window.title, "Sprites");
    }
}
