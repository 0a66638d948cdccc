//! Error types for Warden
//!
//! Errors only surface from construction paths (config, mandatory policy
//! loading, limit validation). Execution paths fold every failure into an
//! `ExecutionOutcome` instead.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Warden error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Policy
    // ========================================================================
    #[error("Policy error: {0}")]
    Policy(String),

    // ========================================================================
    // External conversions
    // ========================================================================
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Helper for configuration errors that carry a path
    pub fn config_at(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Config(format!("{}: {}", path.display(), message))
    }
}
