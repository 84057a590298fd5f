//! Configuration parsing and types.

pub mod env;
pub mod parser;
pub mod types;
pub mod validate;

pub use types::*;

use crate::common::error::ConfigError;

/// Load a config file and apply environment overrides.
///
/// Validation happens when the bridge is constructed.
pub fn load(path: &str) -> Result<Config, ConfigError> {
    parser::load_config(path).map(env::apply_env_overrides)
}
