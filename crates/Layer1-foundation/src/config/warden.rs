//! Warden Config - layered executor configuration
//!
//! Defaults → global `~/.warden/warden.toml` → project `./warden.toml`
//! (or an explicit path) → `WARDEN_*` environment overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Config file name
pub const WARDEN_CONFIG_FILE: &str = "warden.toml";

/// Global config directory under the home directory
pub const WARDEN_GLOBAL_DIR: &str = ".warden";

/// Policy location used when nothing else is configured
pub const DEFAULT_POLICY_PATH: &str = "security/agent_policy.yaml";

/// Default container image for the container backend
pub const DEFAULT_IMAGE: &str = "python:3.12-slim";

// ============================================================================
// Enums
// ============================================================================

/// Which runner executes allowed commands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionBackend {
    /// Native child process under rlimits
    #[default]
    Native,
    /// Ephemeral container
    Container,
}

impl FromStr for ExecutionBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "native" | "process" | "local" => Ok(Self::Native),
            "container" | "docker" => Ok(Self::Container),
            other => Err(Error::Config(format!("unknown backend '{}'", other))),
        }
    }
}

/// When the policy file is read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyMode {
    /// Load once when the executor is built
    #[default]
    Snapshot,
    /// Re-read the file for every call
    PerCall,
}

/// Network mode for the container backend.
///
/// Written as a plain string: `none`, `bridge`, `host`, or any other name
/// for a user-defined network.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NetworkMode {
    /// No network access
    #[default]
    None,
    /// Bridge network (Docker default)
    Bridge,
    /// Host network (full access)
    Host,
    /// Named network
    Custom(String),
}

impl NetworkMode {
    /// Value for Docker's `HostConfig.network_mode`
    pub fn as_docker_mode(&self) -> &str {
        match self {
            Self::None => "none",
            Self::Bridge => "bridge",
            Self::Host => "host",
            Self::Custom(name) => name,
        }
    }
}

impl From<String> for NetworkMode {
    fn from(name: String) -> Self {
        match name.trim() {
            "none" => Self::None,
            "bridge" => Self::Bridge,
            "host" => Self::Host,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl From<NetworkMode> for String {
    fn from(mode: NetworkMode) -> Self {
        mode.as_docker_mode().to_string()
    }
}

/// Hardening applied to containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// All capabilities dropped, no-new-privileges, uid 1000
    #[default]
    Standard,
    /// Standard plus read-only root filesystem and uid `nobody`
    Strict,
    /// Engine defaults (trusted images only)
    Permissive,
}

// ============================================================================
// Sections
// ============================================================================

/// Per-child resource ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// RLIMIT_CPU in seconds
    pub cpu_seconds: u64,
    /// RLIMIT_AS in bytes
    pub memory_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            cpu_seconds: 5,
            memory_bytes: 512 * 1024 * 1024,
        }
    }
}

/// Container backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSettings {
    pub image: String,
    pub network: NetworkMode,
    pub pids_limit: i64,
    /// Pull the image when it is not present locally
    pub pull_missing: bool,
    /// Bound on the engine reachability ping
    pub connect_timeout_ms: u64,
    /// Optional fractional CPU share (e.g. 0.5)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<f64>,
    /// Capability / user / rootfs hardening
    #[serde(default)]
    pub security: SecurityLevel,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            image: DEFAULT_IMAGE.to_string(),
            network: NetworkMode::None,
            pids_limit: 256,
            pull_missing: true,
            connect_timeout_ms: 5_000,
            cpus: None,
            security: SecurityLevel::Standard,
        }
    }
}

impl ContainerSettings {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

// ============================================================================
// Warden Config
// ============================================================================

/// Fully resolved executor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WardenConfig {
    pub policy_path: PathBuf,
    pub policy_required: bool,
    pub policy_mode: PolicyMode,
    pub backend: ExecutionBackend,
    pub timeout_secs: u64,
    pub grace_period_ms: u64,
    pub limits: LimitsConfig,
    pub container: ContainerSettings,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            policy_path: PathBuf::from(DEFAULT_POLICY_PATH),
            policy_required: false,
            policy_mode: PolicyMode::Snapshot,
            backend: ExecutionBackend::Native,
            timeout_secs: 30,
            grace_period_ms: 2_000,
            limits: LimitsConfig::default(),
            container: ContainerSettings::default(),
        }
    }
}

impl WardenConfig {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Load
    // ========================================================================

    /// Global + project merge, then environment overrides.
    ///
    /// `explicit` replaces the project file lookup; unlike the implicit
    /// files it must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::new();

        // 1. Global
        if let Some(home) = dirs::home_dir() {
            let global = home.join(WARDEN_GLOBAL_DIR).join(WARDEN_CONFIG_FILE);
            if let Some(file) = ConfigFile::load_optional(&global)? {
                debug!(path = %global.display(), "Loaded global config");
                config.merge(file);
            }
        }

        // 2. Project (or explicit)
        match explicit {
            Some(path) => {
                let file = ConfigFile::load(path)?;
                debug!(path = %path.display(), "Loaded config");
                config.merge(file);
            }
            None => {
                let project = PathBuf::from(WARDEN_CONFIG_FILE);
                if let Some(file) = ConfigFile::load_optional(&project)? {
                    debug!(path = %project.display(), "Loaded project config");
                    config.merge(file);
                }
            }
        }

        // 3. Environment
        config.apply_env_overrides(|key| std::env::var(key).ok())?;

        config.validate()?;
        Ok(config)
    }

    /// Parse a single TOML document on top of the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(content)?;
        let mut config = Self::new();
        config.merge(file);
        config.validate()?;
        Ok(config)
    }

    /// Apply `WARDEN_*` overrides read through `lookup`
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("WARDEN_POLICY_PATH") {
            self.policy_path = PathBuf::from(path);
        }
        if let Some(backend) = lookup("WARDEN_BACKEND") {
            self.backend = backend.parse()?;
        }
        if let Some(image) = lookup("WARDEN_IMAGE") {
            self.container.image = image;
        }
        if let Some(timeout) = lookup("WARDEN_TIMEOUT_SECS") {
            self.timeout_secs = timeout.trim().parse().map_err(|e| {
                Error::Config(format!("WARDEN_TIMEOUT_SECS='{}': {}", timeout, e))
            })?;
        }
        Ok(())
    }

    /// Reject values that would make every execution meaningless
    pub fn validate(&self) -> Result<()> {
        if self.limits.cpu_seconds == 0 {
            return Err(Error::Config("limits.cpu_seconds must be > 0".to_string()));
        }
        if self.limits.memory_bytes == 0 {
            return Err(Error::Config("limits.memory_bytes must be > 0".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".to_string()));
        }
        if self.container.image.trim().is_empty() {
            return Err(Error::Config("container.image must not be empty".to_string()));
        }
        Ok(())
    }

    // ========================================================================
    // Merge
    // ========================================================================

    /// Merge a parsed file (file values win)
    pub fn merge(&mut self, other: ConfigFile) {
        if let Some(path) = other.policy_path {
            self.policy_path = path;
        }
        if let Some(required) = other.policy_required {
            self.policy_required = required;
        }
        if let Some(mode) = other.policy_mode {
            self.policy_mode = mode;
        }
        if let Some(backend) = other.backend {
            self.backend = backend;
        }
        if let Some(timeout) = other.timeout_secs {
            self.timeout_secs = timeout;
        }
        if let Some(grace) = other.grace_period_ms {
            self.grace_period_ms = grace;
        }
        if let Some(limits) = other.limits {
            if let Some(cpu) = limits.cpu_seconds {
                self.limits.cpu_seconds = cpu;
            }
            if let Some(mem) = limits.memory_bytes {
                self.limits.memory_bytes = mem;
            }
        }
        if let Some(container) = other.container {
            if let Some(image) = container.image {
                self.container.image = image;
            }
            if let Some(network) = container.network {
                self.container.network = network;
            }
            if let Some(pids) = container.pids_limit {
                self.container.pids_limit = pids;
            }
            if let Some(pull) = container.pull_missing {
                self.container.pull_missing = pull;
            }
            if let Some(ms) = container.connect_timeout_ms {
                self.container.connect_timeout_ms = ms;
            }
            if container.cpus.is_some() {
                self.container.cpus = container.cpus;
            }
            if let Some(security) = container.security {
                self.container.security = security;
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    // ========================================================================
    // Builder
    // ========================================================================

    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = path.into();
        self
    }

    pub fn with_backend(mut self, backend: ExecutionBackend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_policy_mode(mut self, mode: PolicyMode) -> Self {
        self.policy_mode = mode;
        self
    }

    pub fn with_policy_required(mut self, required: bool) -> Self {
        self.policy_required = required;
        self
    }
}

// ============================================================================
// On-disk shape
// ============================================================================

/// One config file; every key optional so layers only override what they set
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub policy_path: Option<PathBuf>,
    pub policy_required: Option<bool>,
    pub policy_mode: Option<PolicyMode>,
    pub backend: Option<ExecutionBackend>,
    pub timeout_secs: Option<u64>,
    pub grace_period_ms: Option<u64>,
    pub limits: Option<LimitsFile>,
    pub container: Option<ContainerFile>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsFile {
    pub cpu_seconds: Option<u64>,
    pub memory_bytes: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContainerFile {
    pub image: Option<String>,
    pub network: Option<NetworkMode>,
    pub pids_limit: Option<i64>,
    pub pull_missing: Option<bool>,
    pub connect_timeout_ms: Option<u64>,
    pub cpus: Option<f64>,
    pub security: Option<SecurityLevel>,
}

impl ConfigFile {
    /// Read and parse; the file must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content =
            std::fs::read_to_string(path).map_err(|e| Error::config_at(path, e))?;
        toml::from_str(&content).map_err(|e| Error::config_at(path, e))
    }

    /// `Ok(None)` when the file is absent; parse errors still fail
    pub fn load_optional(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        Self::load(path).map(Some)
    }
}
