//! Command runners and the allow-list they sit behind
//!
//! Provides two execution backends behind the [`Runner`] trait:
//! - `ProcessRunner` - native child process under CPU / address-space rlimits
//! - `ContainerRunner` - ephemeral Docker container (bollard)
//!
//! ## Security
//! - `Policy` - allow-list of commands and script suffixes, fail-closed
//! - `ResourceLimiter` - per-spawn ceilings applied before exec

pub mod container;
pub mod limits;
pub mod local;
pub mod shell_policy;
pub mod r#trait;

pub use container::{
    ContainerRunner, ContainerRunnerConfig, DockerEndpoint, SecurityProfile, MANAGED_LABEL,
};
pub use limits::{ResourceLimiter, ResourceLimits, DEFAULT_CPU_SECONDS, DEFAULT_MEMORY_BYTES};
pub use local::{ProcessRunner, ProcessRunnerConfig, TimeoutPolicy, TimeoutState};
pub use r#trait::{split_command, RunRequest, Runner};
pub use shell_policy::{Policy, PolicyEntry, PolicyIssue, RUN_COMMAND};
