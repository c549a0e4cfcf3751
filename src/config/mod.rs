//! Configuration management for the proof-of-work engine
//!
//! This module handles all configuration-related functionality including:
//! - Loading and parsing configuration files
//! - Generating configuration templates
//!
//! The configuration uses TOML format. Every field has a default, so an
//! empty file describes a normal-mode engine with the stock retention.

/// Core configuration implementation
///
/// Contains the [`Config`] struct and its defaults.
pub mod config;

// Re-export key items for easy access
pub use config::Config;

use crate::utils::error::EngineError;
use std::path::PathBuf;

/// Loads engine configuration from a TOML file
///
/// # Arguments
/// * `path` - Path to the configuration file (anything convertible to PathBuf)
///
/// # Returns
/// * `Ok(Config)` - Successfully loaded configuration
/// * `Err(EngineError)` - If the file couldn't be read, parsed or validated
pub fn load(path: impl Into<PathBuf>) -> Result<Config, EngineError> {
    Config::load(path)
}

/// Generates a commented configuration template
///
/// # Returns
/// String containing a ready-to-use TOML configuration template
pub fn generate_template() -> String {
    Config::generate_template()
}
