//! # warden-foundation
//!
//! Foundation layer for Warden:
//! - Error: the shared error type and `Result` alias
//! - Config: layered configuration (`WardenConfig`)
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  warden CLI                                  │
//! │        │                                     │
//! │        ▼                                     │
//! │  Executor facade ── Policy (allow-list)      │
//! │        │                                     │
//! │   ┌────┴──────────┐                          │
//! │   ▼               ▼                          │
//! │ ProcessRunner  ContainerRunner               │
//! │ (rlimits)      (docker)                      │
//! └──────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Config
// ============================================================================
pub use config::{
    ConfigFile, ContainerSettings, ExecutionBackend, LimitsConfig, NetworkMode, PolicyMode,
    SecurityLevel, WardenConfig, DEFAULT_IMAGE, DEFAULT_POLICY_PATH, WARDEN_CONFIG_FILE,
};
