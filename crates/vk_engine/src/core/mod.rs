//! # Core Engine Module
//!
//! Shared configuration types used by the renderer and the demo binary.

pub mod config;

pub use config::{
    Config, ConfigError, DescriptorPoolConfig, EngineConfig, RendererConfig, ShaderConfig,
    WindowConfig,
};
