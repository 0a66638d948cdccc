//! Executor facade - policy gate in front of the runners
//!
//! Every call returns an [`ExecutionOutcome`]. Denials short-circuit before
//! any runner is touched; runner panics are normalised to `error`.

use crate::executor::{
    ContainerRunner, ContainerRunnerConfig, Policy, ProcessRunner, ProcessRunnerConfig,
    ResourceLimiter, RunRequest, Runner,
};
use crate::outcome::{ExecutionOutcome, REASON_POLICY, REASON_SCRIPT_WHITELIST};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use warden_foundation::{ExecutionBackend, PolicyMode, Result, WardenConfig};

/// Policy-gated command executor
pub struct Executor {
    config: WardenConfig,
    policy: RwLock<Arc<Policy>>,
    limiter: ResourceLimiter,
    /// Backend selected by configuration
    runner: Arc<dyn Runner>,
    /// Backend for explicit container calls
    container: Arc<dyn Runner>,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("backend", &self.runner.name())
            .field("policy_path", &self.config.policy_path)
            .field("policy_mode", &self.config.policy_mode)
            .field("limiter", &self.limiter)
            .finish()
    }
}

impl Executor {
    /// Executor with built-in defaults
    pub fn new() -> Result<Self> {
        Self::from_config(&WardenConfig::default())
    }

    /// Build from configuration.
    ///
    /// Fails on invalid limits, or on an unusable policy file when
    /// `policy_required` is set. Nothing else is fatal.
    pub fn from_config(config: &WardenConfig) -> Result<Self> {
        config.validate()?;
        let limiter = ResourceLimiter::from_config(&config.limits)?;
        let policy = read_policy(config)?;

        let process: Arc<dyn Runner> = Arc::new(ProcessRunner::with_config(ProcessRunnerConfig {
            grace_period: config.grace_period(),
            ..Default::default()
        }));
        let container: Arc<dyn Runner> = Arc::new(ContainerRunner::with_config(
            ContainerRunnerConfig::from_settings(&config.container),
        ));
        let runner = match config.backend {
            ExecutionBackend::Native => Arc::clone(&process),
            ExecutionBackend::Container => Arc::clone(&container),
        };

        info!(
            backend = runner.name(),
            policy_path = %config.policy_path.display(),
            policy_mode = ?config.policy_mode,
            allowed_entries = policy.allowed_actions.len(),
            whitelisted_scripts = policy.whitelisted_scripts.len(),
            cpu_seconds = limiter.cpu_seconds(),
            memory_bytes = limiter.memory_bytes(),
            "Executor ready"
        );

        Ok(Self {
            config: config.clone(),
            policy: RwLock::new(Arc::new(policy)),
            limiter,
            runner,
            container,
        })
    }

    /// Executor over an injected policy and runner, default limits and timeout
    pub fn with_runner(policy: Policy, runner: Arc<dyn Runner>) -> Self {
        let config = WardenConfig::default();
        Self {
            policy: RwLock::new(Arc::new(policy)),
            limiter: ResourceLimiter::default(),
            container: Arc::new(ContainerRunner::with_config(
                ContainerRunnerConfig::from_settings(&config.container),
            )),
            runner,
            config,
        }
    }

    pub fn with_container_runner(mut self, runner: Arc<dyn Runner>) -> Self {
        self.container = runner;
        self
    }

    pub fn with_limiter(mut self, limiter: ResourceLimiter) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn config(&self) -> &WardenConfig {
        &self.config
    }

    /// Name of the configured backend
    pub fn backend(&self) -> &'static str {
        self.runner.name()
    }

    pub fn default_timeout(&self) -> Duration {
        self.config.timeout()
    }

    /// Current policy snapshot
    pub fn policy(&self) -> Arc<Policy> {
        let guard = self
            .policy
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Re-read the policy file into the snapshot
    pub fn reload_policy(&self) -> Result<Arc<Policy>> {
        let policy = Arc::new(read_policy(&self.config)?);
        let mut guard = self
            .policy
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = Arc::clone(&policy);
        info!(
            path = %self.config.policy_path.display(),
            allowed_entries = policy.allowed_actions.len(),
            "Policy reloaded"
        );
        Ok(policy)
    }

    /// Run a command on the configured backend.
    ///
    /// `timeout` defaults to the configured wall-clock bound.
    pub async fn run(
        &self,
        command: &str,
        timeout: Option<Duration>,
        check_policy: bool,
    ) -> ExecutionOutcome {
        let request = self.request(command, timeout);
        let policy = if check_policy {
            match self.policy_for_call() {
                Ok(policy) => Some(policy),
                Err(outcome) => return outcome,
            }
        } else {
            None
        };
        self.execute(&self.runner, request, policy.as_deref()).await
    }

    /// Run a whitelisted script through `bash`
    pub async fn run_script(&self, path: &str, timeout: Option<Duration>) -> ExecutionOutcome {
        let policy = match self.policy_for_call() {
            Ok(policy) => policy,
            Err(outcome) => return outcome,
        };

        if !policy.is_script_whitelisted(path) {
            warn!(path, "Script not whitelisted");
            return ExecutionOutcome::denied(REASON_SCRIPT_WHITELIST);
        }
        if !Path::new(path).exists() {
            warn!(path, "Script not found");
            return ExecutionOutcome::file_missing(path);
        }

        let quoted = match shlex::try_quote(path) {
            Ok(quoted) => quoted.into_owned(),
            Err(e) => return ExecutionOutcome::error(format!("cannot quote script path: {}", e)),
        };
        let request = self
            .request(&format!("bash {}", quoted), timeout)
            .with_script(path);
        self.execute(&self.runner, request, Some(&policy)).await
    }

    /// Run a command in an ephemeral container, whatever the configured backend
    pub async fn run_in_container(
        &self,
        command: &str,
        image: Option<&str>,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome {
        let mut request = self.request(command, timeout);
        if let Some(image) = image {
            request = request.with_image(image);
        }
        let policy = match self.policy_for_call() {
            Ok(policy) => policy,
            Err(outcome) => return outcome,
        };
        self.execute(&self.container, request, Some(&policy)).await
    }

    /// Blocking form of [`Executor::run`] for callers without a runtime
    pub fn run_blocking(
        &self,
        command: &str,
        timeout: Option<Duration>,
        check_policy: bool,
    ) -> ExecutionOutcome {
        block_on(self.run(command, timeout, check_policy))
    }

    /// Blocking form of [`Executor::run_script`]
    pub fn run_script_blocking(&self, path: &str, timeout: Option<Duration>) -> ExecutionOutcome {
        block_on(self.run_script(path, timeout))
    }

    fn request(&self, command: &str, timeout: Option<Duration>) -> RunRequest {
        RunRequest::new(
            command,
            self.limiter.build(),
            timeout.unwrap_or_else(|| self.config.timeout()),
        )
    }

    fn policy_for_call(&self) -> std::result::Result<Arc<Policy>, ExecutionOutcome> {
        match self.config.policy_mode {
            PolicyMode::Snapshot => Ok(self.policy()),
            PolicyMode::PerCall => read_policy(&self.config).map(Arc::new).map_err(|e| {
                error!(error = %e, "Policy unavailable");
                ExecutionOutcome::error(e.to_string())
            }),
        }
    }

    async fn execute(
        &self,
        runner: &Arc<dyn Runner>,
        request: RunRequest,
        policy: Option<&Policy>,
    ) -> ExecutionOutcome {
        if let Some(policy) = policy {
            if !policy.allows_command(&request.command) {
                warn!(command = %request.command, "Command denied by policy");
                return ExecutionOutcome::denied(REASON_POLICY);
            }
        }

        debug!(
            command = %request.command,
            runner = runner.name(),
            timeout_secs = request.timeout.as_secs_f64(),
            cpu_seconds = request.limits.cpu_seconds,
            memory_mib = request.limits.memory_mib(),
            "Dispatching command"
        );

        let outcome = match AssertUnwindSafe(runner.run(&request)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(payload) => {
                let cause = panic_message(payload.as_ref());
                error!(command = %request.command, runner = runner.name(), %cause, "Runner panicked");
                ExecutionOutcome::error(format!("internal error: {}", cause))
            }
        };

        info!(
            command = %request.command,
            status = %outcome.status,
            returncode = ?outcome.returncode,
            duration_secs = outcome.duration_seconds,
            "Command finished"
        );
        outcome
    }
}

fn read_policy(config: &WardenConfig) -> Result<Policy> {
    if config.policy_required {
        Policy::load_required(&config.policy_path)
    } else {
        Ok(Policy::load(&config.policy_path))
    }
}

fn block_on<F>(future: F) -> ExecutionOutcome
where
    F: Future<Output = ExecutionOutcome>,
{
    if tokio::runtime::Handle::try_current().is_ok() {
        return ExecutionOutcome::error(
            "blocking call made from inside an async runtime, use the async API",
        );
    }
    match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime.block_on(future),
        Err(e) => ExecutionOutcome::error(format!("failed to start runtime: {}", e)),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "runner panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::ExecutionStatus;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use warden_foundation::Error;

    /// Records requests instead of spawning
    #[derive(Default)]
    struct CountingRunner {
        calls: AtomicUsize,
        last: Mutex<Option<RunRequest>>,
    }

    impl CountingRunner {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last(&self) -> RunRequest {
            self.last.lock().unwrap().clone().expect("no request recorded")
        }
    }

    #[async_trait]
    impl Runner for CountingRunner {
        async fn run(&self, request: &RunRequest) -> ExecutionOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(request.clone());
            ExecutionOutcome::completed(0, "", "", Duration::from_millis(1))
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    struct PanickingRunner;

    #[async_trait]
    impl Runner for PanickingRunner {
        async fn run(&self, _request: &RunRequest) -> ExecutionOutcome {
            panic!("spawn table corrupted");
        }

        fn name(&self) -> &'static str {
            "panicking"
        }
    }

    fn executor(policy: Policy) -> (Executor, Arc<CountingRunner>) {
        let runner = Arc::new(CountingRunner::default());
        let executor = Executor::with_runner(policy, runner.clone());
        (executor, runner)
    }

    #[tokio::test]
    async fn test_denied_never_spawns() {
        let (executor, runner) = executor(Policy::empty().allow_commands(["echo hello"]));

        let first = executor.run("rm -rf /tmp/x", None, true).await;
        let second = executor.run("rm -rf /tmp/x", None, true).await;

        assert_eq!(first.status, ExecutionStatus::Denied);
        assert_eq!(first.reason.as_deref(), Some("policy"));
        assert_eq!(first, second);
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_exact_and_substring_dispatch() {
        let (executor, runner) =
            executor(Policy::empty().allow_commands(["echo hello", "scripts/build.sh"]));

        assert!(executor.run("  echo hello  ", None, true).await.is_ok());
        assert!(executor
            .run("bash /work/scripts/build.sh --release", None, true)
            .await
            .is_ok());
        assert_eq!(runner.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_policy_check_bypasses_gate() {
        let (executor, runner) = executor(Policy::empty());

        let outcome = executor.run("uname -a", None, false).await;
        assert!(outcome.is_ok());
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_default_timeout_and_limits_forwarded() {
        let (executor, runner) = executor(Policy::empty().allow_commands(["true"]));

        executor.run("true", None, true).await;
        let request = runner.last();
        assert_eq!(request.timeout, Duration::from_secs(30));
        assert_eq!(request.limits.cpu_seconds, 5);
        assert_eq!(request.limits.memory_bytes, 512 * 1024 * 1024);

        executor.run("true", Some(Duration::from_secs(2)), true).await;
        assert_eq!(runner.last().timeout, Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_script_not_whitelisted_is_denied_without_fs_check() {
        let (executor, runner) = executor(
            Policy::empty()
                .allow_commands(["bash"])
                .whitelist_scripts(["scripts/ok.sh"]),
        );

        let outcome = executor.run_script("/definitely/not/here/evil.sh", None).await;
        assert_eq!(outcome.status, ExecutionStatus::Denied);
        assert_eq!(outcome.reason.as_deref(), Some("script_whitelist"));
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_whitelisted_missing_script() {
        let (executor, runner) = executor(
            Policy::empty()
                .allow_commands(["bash"])
                .whitelist_scripts(["ok.sh"]),
        );

        let outcome = executor.run_script("/definitely/not/here/ok.sh", None).await;
        assert_eq!(outcome.status, ExecutionStatus::FileMissing);
        assert_eq!(runner.calls(), 0);
    }

    #[tokio::test]
    async fn test_script_runs_through_bash_and_command_policy() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("my job.sh");
        std::fs::write(&script, "echo hi\n").unwrap();
        let path = script.to_string_lossy().into_owned();

        // Whitelisted but no run_command entry covers it
        let (whitelisted_only, runner) = executor(Policy::empty().whitelist_scripts(["job.sh"]));
        let outcome = whitelisted_only.run_script(&path, None).await;
        assert_eq!(outcome.status, ExecutionStatus::Denied);
        assert_eq!(outcome.reason.as_deref(), Some("policy"));
        assert_eq!(runner.calls(), 0);

        let (executor, runner) = executor(
            Policy::empty()
                .allow_commands(["job.sh"])
                .whitelist_scripts(["job.sh"]),
        );
        let outcome = executor.run_script(&path, None).await;
        assert!(outcome.is_ok());
        let command = runner.last().command;
        assert!(command.starts_with("bash "));
        assert_eq!(
            crate::executor::split_command(&command).unwrap(),
            vec!["bash".to_string(), path]
        );
    }

    #[tokio::test]
    async fn test_script_request_names_host_file() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "echo hi\n").unwrap();
        let path = script.to_string_lossy().into_owned();

        let (executor, runner) = executor(
            Policy::empty()
                .allow_commands(["job.sh"])
                .whitelist_scripts(["job.sh"]),
        );
        assert!(executor.run_script(&path, None).await.is_ok());
        assert_eq!(runner.last().script, Some(script));

        executor.run("job.sh", None, true).await;
        assert!(runner.last().script.is_none());
    }

    #[test]
    fn test_release_profile_unwinds() {
        // Runner panics are only caught when panics unwind
        let manifest = include_str!("../../../Cargo.toml");
        assert!(!manifest
            .lines()
            .any(|line| line.trim_start().starts_with("panic") && line.contains("abort")));
    }

    #[tokio::test]
    async fn test_runner_panic_becomes_error() {
        let executor = Executor::with_runner(
            Policy::empty().allow_commands(["echo"]),
            Arc::new(PanickingRunner),
        );

        let outcome = executor.run("echo hi", None, true).await;
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert!(outcome.reason.unwrap().contains("spawn table corrupted"));
    }

    #[tokio::test]
    async fn test_run_in_container_uses_container_runner() {
        let container = Arc::new(CountingRunner::default());
        let (executor, native) = executor(Policy::empty().allow_commands(["python3 -V"]));
        let executor = executor.with_container_runner(container.clone());

        let denied = executor.run_in_container("ls /", None, None).await;
        assert_eq!(denied.status, ExecutionStatus::Denied);

        let outcome = executor
            .run_in_container("python3 -V", Some("python:3.11-alpine"), None)
            .await;
        assert!(outcome.is_ok());
        assert_eq!(container.calls(), 1);
        assert_eq!(native.calls(), 0);
        assert_eq!(
            container.last().image.as_deref(),
            Some("python:3.11-alpine")
        );
    }

    #[test]
    fn test_from_config_policy_required() {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig::default()
            .with_policy_path(dir.path().join("missing.yaml"))
            .with_policy_required(true);
        assert!(matches!(
            Executor::from_config(&config),
            Err(Error::Policy(_))
        ));

        let config = config.with_policy_required(false);
        let executor = Executor::from_config(&config).unwrap();
        assert!(executor.policy().is_empty());
        assert_eq!(executor.backend(), "process");
    }

    #[test]
    fn test_container_backend_selected() {
        let dir = tempfile::tempdir().unwrap();
        let config = WardenConfig::default()
            .with_policy_path(dir.path().join("policy.yaml"))
            .with_backend(ExecutionBackend::Container);
        let executor = Executor::from_config(&config).unwrap();
        assert_eq!(executor.backend(), "container");
    }

    #[test]
    fn test_reload_and_per_call_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("policy.yaml");
        std::fs::write(
            &path,
            "allowed_actions:\n  - type: run_command\n    commands: [\"echo one\"]\n",
        )
        .unwrap();

        let config = WardenConfig::default().with_policy_path(&path);
        let snapshot = Executor::from_config(&config).unwrap();
        let per_call =
            Executor::from_config(&config.clone().with_policy_mode(PolicyMode::PerCall)).unwrap();

        std::fs::write(
            &path,
            "allowed_actions:\n  - type: run_command\n    commands: [\"echo two\"]\n",
        )
        .unwrap();

        assert!(snapshot.policy().allows_command("echo one"));
        assert!(!snapshot.policy().allows_command("echo two"));
        assert!(per_call.policy_for_call().unwrap().allows_command("echo two"));

        let reloaded = snapshot.reload_policy().unwrap();
        assert!(reloaded.allows_command("echo two"));
        assert!(snapshot.policy().allows_command("echo two"));
        assert!(!snapshot.policy().allows_command("echo one"));
    }

    #[test]
    fn test_blocking_wrappers() {
        let (executor, runner) = executor(Policy::empty().allow_commands(["echo"]));

        assert!(executor.run_blocking("echo hi", None, true).is_ok());
        assert_eq!(
            executor.run_blocking("ls", None, true).status,
            ExecutionStatus::Denied
        );
        assert_eq!(
            executor.run_script_blocking("x.sh", None).status,
            ExecutionStatus::Denied
        );
        assert_eq!(runner.calls(), 1);
    }

    #[tokio::test]
    async fn test_blocking_inside_runtime_is_error() {
        let (executor, runner) = executor(Policy::empty().allow_commands(["echo"]));
        let outcome = executor.run_blocking("echo hi", None, true);
        assert_eq!(outcome.status, ExecutionStatus::Error);
        assert_eq!(runner.calls(), 0);
    }
}
