//! # warden-task
//!
//! Policy-gated command execution for Warden.
//!
//! ## Features
//!
//! - Fail-closed allow-list for commands and scripts
//! - CPU / address-space rlimits committed before exec
//! - Wall-clock timeout with SIGTERM -> SIGKILL escalation
//! - Optional ephemeral-container backend
//! - One outcome record for every call, never an error
//!
//! ```no_run
//! # async fn demo() -> warden_foundation::Result<()> {
//! use warden_task::Executor;
//!
//! let executor = Executor::new()?;
//! let outcome = executor.run("echo hello", None, true).await;
//! println!("{}", outcome.status);
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod gate;
pub mod outcome;

// Facade
pub use gate::Executor;
pub use outcome::{ExecutionOutcome, ExecutionStatus, REASON_POLICY, REASON_SCRIPT_WHITELIST};

// Runners
pub use executor::{
    split_command, ContainerRunner, ContainerRunnerConfig, DockerEndpoint, ProcessRunner,
    ProcessRunnerConfig, ResourceLimiter, ResourceLimits, RunRequest, Runner, SecurityProfile,
    TimeoutPolicy,
};

// Policy
pub use executor::{Policy, PolicyEntry, PolicyIssue};
