//! Logging utilities built on the `log` facade

pub use log::{debug, error, info, trace, warn};

use crate::config::RuntimeConfig;

/// Initialize the logging system from `RUST_LOG`
pub fn init() {
    env_logger::init();
}

/// Initialize the logging system with a default filter
///
/// `RUST_LOG` still takes precedence when it is set.
pub fn init_with_filter(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();
}

/// Initialize the logging system using the filter from a runtime config
pub fn init_from_config(config: &RuntimeConfig) {
    match config.log_filter.as_deref() {
        Some(filter) => init_with_filter(filter),
        None => init(),
    }
}

/// Install a test-friendly logger, ignoring repeated initialization
pub fn try_init_for_tests() {
    let _ = env_logger::builder().is_test(true).try_init();
}
