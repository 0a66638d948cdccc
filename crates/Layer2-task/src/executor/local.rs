//! Process runner - runs one command as a native child process
//!
//! Features:
//! - argv execution (no shell), shell-word splitting via shlex
//! - CPU / address-space rlimits committed in a pre-exec hook
//! - Full stdout/stderr capture
//! - Graceful timeout with SIGTERM -> SIGKILL escalation on the process group

use crate::executor::limits::ResourceLimits;
use crate::executor::r#trait::{split_command, RunRequest, Runner};
use crate::outcome::ExecutionOutcome;
use async_trait::async_trait;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// How long output readers may keep draining after the child is gone
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Timeout policy for one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPolicy {
    /// Hard timeout - kill immediately when exceeded
    Hard(Duration),
    /// Soft timeout with grace period
    /// (soft_timeout, grace_period) - sends SIGTERM at soft, SIGKILL at soft + grace
    Graceful {
        soft_timeout: Duration,
        grace_period: Duration,
    },
}

impl TimeoutPolicy {
    /// Create a graceful timeout
    pub fn graceful(timeout: Duration, grace_period: Duration) -> Self {
        if grace_period.is_zero() {
            Self::Hard(timeout)
        } else {
            Self::Graceful {
                soft_timeout: timeout,
                grace_period,
            }
        }
    }

    /// The wall-clock bound reported to callers
    pub fn limit(&self) -> Duration {
        match self {
            Self::Hard(d) => *d,
            Self::Graceful { soft_timeout, .. } => *soft_timeout,
        }
    }
}

/// How a timed-out child was brought down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutState {
    /// Exited after the termination signal
    SoftTimeout,
    /// Needed SIGKILL
    HardTimeout,
}

/// Process runner configuration
#[derive(Debug, Clone)]
pub struct ProcessRunnerConfig {
    /// Delay between SIGTERM and SIGKILL on timeout
    pub grace_period: Duration,
    /// Put the child in its own process group and signal the whole group (Unix only)
    pub kill_process_group: bool,
}

impl Default for ProcessRunnerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(2),
            kill_process_group: true,
        }
    }
}

enum WaitResult {
    Exited(ExitStatus),
    TimedOut(TimeoutState),
    Failed(std::io::Error),
}

/// Runs commands directly on the host under rlimits
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner {
    config: ProcessRunnerConfig,
}

impl ProcessRunner {
    /// Create a new process runner
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with configuration
    pub fn with_config(config: ProcessRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessRunnerConfig {
        &self.config
    }

    fn build_command(&self, argv: &[String], limits: ResourceLimits) -> Command {
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        {
            if self.config.kill_process_group {
                cmd.process_group(0);
            }
            // SAFETY: the hook runs between fork and exec and only calls
            // setrlimit, which is async-signal-safe and does not allocate.
            unsafe {
                cmd.pre_exec(move || limits.apply_to_current_process());
            }
        }
        #[cfg(not(unix))]
        {
            warn!(
                cpu_seconds = limits.cpu_seconds,
                memory_bytes = limits.memory_bytes,
                "Resource limits are not enforced on this platform"
            );
        }

        cmd
    }

    async fn wait_with_policy(&self, child: &mut Child, policy: TimeoutPolicy) -> WaitResult {
        match policy {
            TimeoutPolicy::Hard(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(Ok(status)) => WaitResult::Exited(status),
                Ok(Err(e)) => WaitResult::Failed(e),
                Err(_) => {
                    self.force_kill(child).await;
                    WaitResult::TimedOut(TimeoutState::HardTimeout)
                }
            },
            TimeoutPolicy::Graceful {
                soft_timeout,
                grace_period,
            } => match tokio::time::timeout(soft_timeout, child.wait()).await {
                Ok(Ok(status)) => WaitResult::Exited(status),
                Ok(Err(e)) => WaitResult::Failed(e),
                Err(_) => {
                    self.send_signal(child, Signal::Terminate);
                    match tokio::time::timeout(grace_period, child.wait()).await {
                        Ok(_) => WaitResult::TimedOut(TimeoutState::SoftTimeout),
                        Err(_) => {
                            self.force_kill(child).await;
                            WaitResult::TimedOut(TimeoutState::HardTimeout)
                        }
                    }
                }
            },
        }
    }

    async fn force_kill(&self, child: &mut Child) {
        self.send_signal(child, Signal::Kill);
        if let Err(e) = child.kill().await {
            debug!(error = %e, "Kill after timeout reported an error");
        }
    }

    #[cfg(unix)]
    fn send_signal(&self, child: &Child, signal: Signal) {
        let Some(pid) = child.id() else {
            return;
        };
        let signo = match signal {
            Signal::Terminate => libc::SIGTERM,
            Signal::Kill => libc::SIGKILL,
        };
        // SAFETY: plain syscalls on a pid/pgid we own.
        let ret = unsafe {
            if self.config.kill_process_group {
                libc::killpg(pid as libc::pid_t, signo)
            } else {
                libc::kill(pid as libc::pid_t, signo)
            }
        };
        if ret != 0 {
            debug!(
                pid,
                signo,
                error = %std::io::Error::last_os_error(),
                "Signal delivery failed"
            );
        }
    }

    #[cfg(not(unix))]
    fn send_signal(&self, child: &mut Child, signal: Signal) {
        // No SIGTERM here; the grace period runs out and kill() follows.
        if matches!(signal, Signal::Kill) {
            let _ = child.start_kill();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Terminate,
    Kill,
}

#[async_trait]
impl Runner for ProcessRunner {
    async fn run(&self, request: &RunRequest) -> ExecutionOutcome {
        let argv = match split_command(&request.command) {
            Ok(argv) => argv,
            Err(reason) => {
                warn!(command = %request.command, "{}", reason);
                return ExecutionOutcome::error(reason);
            }
        };

        let mut cmd = self.build_command(&argv, request.limits);
        let policy = TimeoutPolicy::graceful(request.timeout, self.config.grace_period);

        debug!(
            command = %request.command,
            cpu_seconds = request.limits.cpu_seconds,
            memory_mib = request.limits.memory_mib(),
            timeout_secs = policy.limit().as_secs_f64(),
            "Spawning process"
        );

        let started = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!(command = %request.command, error = %e, "Failed to spawn process");
                return ExecutionOutcome::error(format!("failed to spawn '{}': {}", argv[0], e))
                    .with_duration(started.elapsed());
            }
        };

        let stdout = OutputCapture::spawn(child.stdout.take());
        let stderr = OutputCapture::spawn(child.stderr.take());

        let waited = self.wait_with_policy(&mut child, policy).await;

        let stdout = stdout.finish().await;
        let stderr = stderr.finish().await;
        let duration = started.elapsed();

        match waited {
            WaitResult::Exited(status) => {
                let outcome = classify_exit(status, stdout, stderr, duration);
                debug!(
                    command = %request.command,
                    status = %outcome.status,
                    returncode = ?outcome.returncode,
                    duration_secs = duration.as_secs_f64(),
                    "Process finished"
                );
                outcome
            }
            WaitResult::TimedOut(state) => {
                error!(
                    command = %request.command,
                    timeout_secs = policy.limit().as_secs_f64(),
                    ?state,
                    "Command timeout"
                );
                let outcome = ExecutionOutcome::timeout(policy.limit(), stdout, stderr, duration);
                let how = match state {
                    TimeoutState::SoftTimeout => "terminated by SIGTERM",
                    TimeoutState::HardTimeout => "killed by SIGKILL",
                };
                let reason = format!("{}; {}", outcome.reason.clone().unwrap_or_default(), how);
                outcome.with_reason(reason)
            }
            WaitResult::Failed(e) => {
                error!(command = %request.command, error = %e, "Waiting on process failed");
                ExecutionOutcome::error(format!("failed to wait on process: {}", e))
                    .with_duration(duration)
            }
        }
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

/// Map an exit status onto the outcome vocabulary.
///
/// Signal deaths become `failed` with `returncode = -signal`. SIGKILL can come
/// from the CPU hard limit, the OOM killer or another process, so it is not
/// attributed.
fn classify_exit(
    status: ExitStatus,
    stdout: String,
    stderr: String,
    duration: Duration,
) -> ExecutionOutcome {
    if let Some(code) = status.code() {
        return ExecutionOutcome::completed(code, stdout, stderr, duration);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            let reason = match signo {
                libc::SIGXCPU => "cpu time limit exceeded (SIGXCPU)".to_string(),
                libc::SIGKILL => "killed by SIGKILL".to_string(),
                libc::SIGSEGV => "segmentation fault (SIGSEGV)".to_string(),
                libc::SIGABRT => "aborted (SIGABRT)".to_string(),
                other => format!("terminated by signal {}", other),
            };
            return ExecutionOutcome::completed(-signo, stdout, stderr, duration)
                .with_reason(reason);
        }
    }

    ExecutionOutcome::completed(-1, stdout, stderr, duration)
        .with_reason("process ended without an exit code")
}

/// Background reader that accumulates one pipe
struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl OutputCapture {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let handle = pipe.map(|mut pipe| {
            let buffer = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => buffer
                            .lock()
                            .unwrap_or_else(|poisoned| poisoned.into_inner())
                            .extend_from_slice(&chunk[..n]),
                    }
                }
            })
        });
        Self { buffer, handle }
    }

    /// Wait for EOF (bounded; a leaked descendant may hold the pipe open)
    async fn finish(mut self) -> String {
        if let Some(mut handle) = self.handle.take() {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut handle)
                .await
                .is_err()
            {
                warn!("Output pipe still open after process exit, truncating capture");
                handle.abort();
            }
        }
        let bytes = self
            .buffer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let text = String::from_utf8_lossy(&bytes).into_owned();
        text
    }
}
