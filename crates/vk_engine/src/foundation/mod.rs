//! Foundation module - Core utilities and types
//!
//! - Math types and operations
//! - Logging setup

pub mod logging;
pub mod math;
