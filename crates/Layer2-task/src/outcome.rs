//! Execution outcome - the one result shape every call returns

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Reason attached to command denials
pub const REASON_POLICY: &str = "policy";

/// Reason attached to script denials
pub const REASON_SCRIPT_WHITELIST: &str = "script_whitelist";

/// How a call ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionStatus {
    /// Exit code 0
    #[serde(rename = "ok")]
    Ok,
    /// Ran to completion with a non-zero exit or was killed by a resource limit
    #[serde(rename = "failed")]
    Failed,
    /// Rejected before anything was spawned
    #[serde(rename = "denied")]
    Denied,
    /// Exceeded the wall-clock bound and was killed
    #[serde(rename = "timeout")]
    Timeout,
    /// Could not be spawned, or an internal fault
    #[serde(rename = "error")]
    Error,
    /// Script path does not exist
    #[serde(rename = "file_missing")]
    FileMissing,
    /// Container backend selected but no reachable engine
    #[serde(rename = "docker-not-available")]
    DockerNotAvailable,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Failed => "failed",
            Self::Denied => "denied",
            Self::Timeout => "timeout",
            Self::Error => "error",
            Self::FileMissing => "file_missing",
            Self::DockerNotAvailable => "docker-not-available",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result record of one execution call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub returncode: Option<i32>,

    #[serde(default)]
    pub stdout: String,

    #[serde(default)]
    pub stderr: String,

    /// Wall time from spawn to reap, zero when nothing ran
    #[serde(default)]
    pub duration_seconds: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ExecutionOutcome {
    fn bare(status: ExecutionStatus, reason: Option<String>) -> Self {
        Self {
            status,
            returncode: None,
            stdout: String::new(),
            stderr: String::new(),
            duration_seconds: 0.0,
            reason,
        }
    }

    /// Process ran to completion; status follows the exit code
    pub fn completed(
        returncode: i32,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        let status = if returncode == 0 {
            ExecutionStatus::Ok
        } else {
            ExecutionStatus::Failed
        };
        Self {
            status,
            returncode: Some(returncode),
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_seconds: duration.as_secs_f64(),
            reason: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        Self::bare(ExecutionStatus::Denied, Some(reason.into()))
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::bare(ExecutionStatus::Error, Some(reason.into()))
    }

    pub fn file_missing(path: &str) -> Self {
        Self::bare(
            ExecutionStatus::FileMissing,
            Some(format!("script not found: {}", path)),
        )
    }

    pub fn docker_not_available(reason: impl Into<String>) -> Self {
        Self::bare(ExecutionStatus::DockerNotAvailable, Some(reason.into()))
    }

    /// Killed at the wall-clock bound; keeps whatever output was captured
    pub fn timeout(
        limit: Duration,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            status: ExecutionStatus::Timeout,
            returncode: None,
            stdout: stdout.into(),
            stderr: stderr.into(),
            duration_seconds: duration.as_secs_f64(),
            reason: Some(format!(
                "command timed out after {:.1}s",
                limit.as_secs_f64()
            )),
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_seconds = duration.as_secs_f64();
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ExecutionStatus::Ok
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_seconds.max(0.0))
    }
}
