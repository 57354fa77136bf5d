//! # Engine Configuration
//!
//! Everything the engine reads at startup: window, renderer, descriptor pool
//! sizing and shader binary locations. Loaded from TOML or RON through the
//! [`Config`] trait; any field left out takes its default.
//!
//! ```toml
//! log_level = "info"
//!
//! [window]
//! title = "vk_engine"
//! width = 1700
//! height = 900
//!
//! [renderer]
//! frames_in_flight = 2
//! fence_timeout_ns = 1000000000
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use crate::config::{Config, ConfigError};
use crate::render::vulkan::descriptors::{DescriptorKind, PoolSizeRatio};

/// Largest supported ring of frames in flight
pub const MAX_FRAMES_IN_FLIGHT: usize = 8;

/// Window creation parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Title bar text
    pub title: String,
    /// Initial width in screen coordinates
    pub width: u32,
    /// Initial height in screen coordinates
    pub height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "vk_engine".to_string(),
            width: 1700,
            height: 900,
        }
    }
}

/// Sizing of one descriptor pool, or of a growable allocator's first pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorPoolConfig {
    /// Set capacity
    pub sets: u32,
    /// Descriptors reserved per set, by kind
    pub ratios: Vec<PoolSizeRatio>,
}

impl DescriptorPoolConfig {
    /// Pool for the process-lifetime sets (the draw image binding)
    pub fn global_default() -> Self {
        Self {
            sets: 10,
            ratios: vec![PoolSizeRatio::new(DescriptorKind::StorageImage, 1.0)],
        }
    }

    /// Starting point of each frame slot's growable allocator
    pub fn frame_default() -> Self {
        Self {
            sets: 1000,
            ratios: vec![
                PoolSizeRatio::new(DescriptorKind::StorageImage, 3.0),
                PoolSizeRatio::new(DescriptorKind::StorageBuffer, 3.0),
                PoolSizeRatio::new(DescriptorKind::UniformBuffer, 3.0),
                PoolSizeRatio::new(DescriptorKind::CombinedImageSampler, 4.0),
            ],
        }
    }

    fn validate(&self, name: &str) -> Result<(), ConfigError> {
        if self.sets == 0 {
            return Err(ConfigError::Invalid(format!("{name}: pool must hold at least one set")));
        }
        if self.ratios.is_empty() {
            return Err(ConfigError::Invalid(format!("{name}: no descriptor ratios")));
        }
        if let Some(bad) = self.ratios.iter().find(|r| !(r.ratio > 0.0)) {
            return Err(ConfigError::Invalid(format!(
                "{name}: ratio for {:?} must be positive, got {}",
                bad.kind, bad.ratio
            )));
        }
        Ok(())
    }
}

/// Locations of compiled shader binaries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderConfig {
    /// Gradient background effect
    pub gradient: PathBuf,
    /// Starfield sky background effect
    pub sky: PathBuf,
    /// Mesh vertex stage
    pub mesh_vertex: PathBuf,
    /// Mesh fragment stage
    pub mesh_fragment: PathBuf,
}

impl Default for ShaderConfig {
    fn default() -> Self {
        let dir = PathBuf::from("target/shaders");
        Self {
            gradient: dir.join("gradient.comp.spv"),
            sky: dir.join("sky.comp.spv"),
            mesh_vertex: dir.join("mesh.vert.spv"),
            mesh_fragment: dir.join("mesh.frag.spv"),
        }
    }
}

/// Renderer settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Number of frame slots
    pub frames_in_flight: usize,
    /// Bound on waiting for a frame slot's fence
    pub fence_timeout_ns: u64,
    /// Validation layers; `None` enables them in debug builds only
    pub enable_validation: Option<bool>,
    /// Fixed pool for process-lifetime descriptor sets
    pub global_descriptors: DescriptorPoolConfig,
    /// Initial pool of each frame slot's growable allocator
    pub frame_descriptors: DescriptorPoolConfig,
    /// Shader binaries
    pub shaders: ShaderConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            fence_timeout_ns: 1_000_000_000,
            enable_validation: None,
            global_descriptors: DescriptorPoolConfig::global_default(),
            frame_descriptors: DescriptorPoolConfig::frame_default(),
            shaders: ShaderConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Whether validation layers should be requested
    pub fn validation_enabled(&self) -> bool {
        self.enable_validation.unwrap_or(cfg!(debug_assertions))
    }
}

/// Top-level engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Default log filter when `RUST_LOG` is unset
    pub log_level: String,
    /// Window settings
    pub window: WindowConfig,
    /// Renderer settings
    pub renderer: RendererConfig,
}

impl Config for EngineConfig {}

impl EngineConfig {
    /// Default configuration with `info` logging
    pub fn new() -> Self {
        Self {
            log_level: "info".to_string(),
            ..Default::default()
        }
    }

    /// Set the default log filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the window title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.window.title = title.into();
        self
    }

    /// Force validation layers on or off
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.renderer.enable_validation = Some(enabled);
        self
    }

    /// Log filter to fall back on
    pub fn effective_log_level(&self) -> &str {
        if self.log_level.is_empty() {
            "info"
        } else {
            &self.log_level
        }
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.title.trim().is_empty() {
            return Err(ConfigError::Invalid("window title cannot be empty".to_string()));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }

        let renderer = &self.renderer;
        if !(1..=MAX_FRAMES_IN_FLIGHT).contains(&renderer.frames_in_flight) {
            return Err(ConfigError::Invalid(format!(
                "frames_in_flight must be between 1 and {MAX_FRAMES_IN_FLIGHT}, got {}",
                renderer.frames_in_flight
            )));
        }
        if renderer.fence_timeout_ns == 0 {
            return Err(ConfigError::Invalid("fence_timeout_ns must be non-zero".to_string()));
        }
        renderer.global_descriptors.validate("global_descriptors")?;
        renderer.frame_descriptors.validate("frame_descriptors")?;
        Ok(())
    }
}
