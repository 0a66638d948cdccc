//! Config - layered executor configuration
//!
//! - `warden.rs` - WardenConfig, file shape, env overrides

mod warden;

pub use warden::{
    ConfigFile, ContainerFile, ContainerSettings, ExecutionBackend, LimitsConfig, LimitsFile,
    NetworkMode, PolicyMode, SecurityLevel, WardenConfig, DEFAULT_IMAGE, DEFAULT_POLICY_PATH,
    WARDEN_CONFIG_FILE, WARDEN_GLOBAL_DIR,
};
