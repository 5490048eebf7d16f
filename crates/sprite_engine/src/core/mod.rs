//! Core engine settings shared by every subsystem

pub mod config;

pub use config::{
    Config, ConfigError, DescriptorQuotas, RendererConfig, ShaderConfig, WindowConfig,
    MAX_FRAMES_IN_FLIGHT,
};
