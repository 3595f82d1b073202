//! # Configuration File Loading
//!
//! Loads pool configuration from TOML files. Fields missing from the file keep
//! their defaults.

use crate::ConfigError;
use crate::config::PoolConfig;
use std::path::Path;

/// Load pool configuration from a TOML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("dockertestx.toml"))?;
///     println!("max wait: {}s", config.max_wait_seconds);
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Returns `ConfigError` for:
/// - File not found
/// - Invalid TOML syntax or field types
pub fn load_from_toml(path: &Path) -> Result<PoolConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_e| ConfigError::FileNotFound(path.display().to_string()))?;

    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(e.to_string()))
}
