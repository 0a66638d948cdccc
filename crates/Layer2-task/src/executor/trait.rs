//! Runner trait

use crate::executor::limits::ResourceLimits;
use crate::outcome::ExecutionOutcome;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;

/// One execution request, already authorized
#[derive(Debug, Clone)]
pub struct RunRequest {
    /// Command string, shell-word split by the runner
    pub command: String,
    /// Ceilings for this spawn
    pub limits: ResourceLimits,
    /// Wall-clock bound
    pub timeout: Duration,
    /// Image override for container runners
    pub image: Option<String>,
    /// Host script the command runs; container runners mount it read-only
    pub script: Option<PathBuf>,
}

impl RunRequest {
    pub fn new(command: impl Into<String>, limits: ResourceLimits, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            limits,
            timeout,
            image: None,
            script: None,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_script(mut self, path: impl Into<PathBuf>) -> Self {
        self.script = Some(path.into());
        self
    }
}

/// Runner trait - implement to add new execution backends.
///
/// Runners never fail: every problem is reported in the outcome.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Execute one request to completion
    async fn run(&self, request: &RunRequest) -> ExecutionOutcome;

    /// Get runner name
    fn name(&self) -> &'static str;
}

/// Split a command string into argv without interpreting shell metacharacters
pub fn split_command(command: &str) -> Result<Vec<String>, String> {
    let argv = shlex::split(command)
        .ok_or_else(|| format!("malformed command (unbalanced quotes): {}", command))?;
    if argv.is_empty() {
        return Err("empty command".to_string());
    }
    Ok(argv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_quotes() {
        let argv = split_command(r#"python3 -c "print('a b')" --flag"#).unwrap();
        assert_eq!(argv, vec!["python3", "-c", "print('a b')", "--flag"]);
    }

    #[test]
    fn test_metacharacters_stay_literal() {
        let argv = split_command("echo hi; rm -rf / | cat").unwrap();
        assert_eq!(argv, vec!["echo", "hi;", "rm", "-rf", "/", "|", "cat"]);
    }

    #[test]
    fn test_unbalanced_quote_is_error() {
        assert!(split_command("echo 'oops").unwrap_err().contains("malformed"));
    }

    #[test]
    fn test_empty_is_error() {
        assert_eq!(split_command("   ").unwrap_err(), "empty command");
    }
}
