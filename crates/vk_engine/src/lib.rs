//! # vk_engine
//!
//! A Vulkan 1.3 renderer built around a small, testable core:
//!
//! - **Descriptor allocation**: a fixed single-pool allocator and a growable
//!   pool-of-pools allocator that retries once on exhaustion
//! - **Descriptor writes**: batched image and buffer updates committed in one call
//! - **Frames in flight**: a ring of per-frame command buffers, sync objects,
//!   descriptor allocators and deletion queues gated by fences
//! - **Deferred destruction**: typed LIFO deletion queues flushed per frame and
//!   at shutdown
//!
//! Around it sits the renderer glue: window and device setup, swapchain,
//! compute background effects, a dynamic-rendering mesh pipeline and an
//! arena-backed scene graph.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_engine::prelude::*;
//!
//! fn main() -> Result<(), EngineError> {
//!     let config = EngineConfig::new();
//!     vk_engine::foundation::logging::init_with_level(config.effective_log_level());
//!
//!     let mut engine = VulkanEngine::new(config)?;
//!     engine.run();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod engine;
pub mod foundation;
pub mod render;

/// Common imports
pub mod prelude {
    pub use crate::core::config::{Config, ConfigError, EngineConfig};
    pub use crate::engine::{EngineError, VulkanEngine};
    pub use crate::render::vulkan::{abort_on_fatal, VulkanError, VulkanResult};
}
