//! Logging initialisation

use env_logger::Env;

pub use log::{debug, error, info, trace, warn};

/// Initialize the logging system
///
/// `RUST_LOG` wins when set; otherwise `default_level` (for example `"info"`
/// or `"vk_engine=debug"`) is used. Calling this twice is harmless.
pub fn init_with_level(default_level: &str) {
    let result = env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .try_init();
    if result.is_err() {
        log::debug!("Logger already initialised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_does_not_panic() {
        init_with_level("warn");
        init_with_level("debug");
    }
}
