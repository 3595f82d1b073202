//! # Configuration System
//!
//! Pool configuration for the dockertestx container fixtures.
//!
//! This crate provides:
//! - `PoolConfig`: retry budget and container start timeout
//! - Environment variable loading
//! - TOML file loading
//! - Configuration precedence (env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;

pub use config::PoolConfig;
pub use file_loader::load_from_toml;
pub use loader::{apply_env, load, load_from_env};
pub use validator::Validate;

/// Configuration loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("Validation failed: {0}")]
    Validation(String)
}
