//! Container runner - runs one command inside an ephemeral Docker container
//!
//! Features:
//! - Isolated execution (no network by default, all capabilities dropped)
//! - CPU / memory ceilings mirrored at the container level
//! - Wall-clock timeout by killing the container
//! - Teardown on every path, including panics and cancellation
//! - `docker-not-available` instead of an error when no engine is reachable

use crate::executor::limits::ResourceLimits;
use crate::executor::r#trait::{split_command, RunRequest, Runner};
use crate::outcome::ExecutionOutcome;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, KillContainerOptions, LogOutput,
    LogsOptions, RemoveContainerOptions, StartContainerOptions, WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::models::{HostConfig, Mount, MountTypeEnum, ResourcesUlimits};
use bollard::Docker;
use futures::{StreamExt, TryStreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use warden_foundation::{ContainerSettings, NetworkMode, SecurityLevel};

/// Label put on every container this runner creates
pub const MANAGED_LABEL: &str = "warden.managed";

/// Where a script run through the container backend is mounted
pub const SCRIPT_MOUNT_DIR: &str = "/opt/warden/scripts";

/// Bound on log collection after the container stopped
const LOG_COLLECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client-side request timeout when connecting to an explicit socket
#[cfg(unix)]
const SOCKET_TIMEOUT_SECS: u64 = 120;

/// Where to find the engine
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DockerEndpoint {
    /// `DOCKER_HOST` or the platform default socket
    #[default]
    LocalDefaults,
    /// Explicit unix socket path
    #[cfg(unix)]
    Unix(String),
}

/// Security profile for container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityProfile {
    /// Drop all capabilities except specified
    pub drop_caps: Vec<String>,
    /// Add specific capabilities
    pub add_caps: Vec<String>,
    /// Run as non-root user
    pub user: Option<String>,
    /// No new privileges
    pub no_new_privileges: bool,
    /// Read-only root filesystem
    pub read_only: bool,
}

impl Default for SecurityProfile {
    fn default() -> Self {
        Self {
            drop_caps: vec!["ALL".to_string()],
            add_caps: vec![],
            user: Some("1000:1000".to_string()),
            no_new_privileges: true,
            read_only: false,
        }
    }
}

impl SecurityProfile {
    pub fn for_level(level: SecurityLevel) -> Self {
        match level {
            SecurityLevel::Standard => Self::default(),
            SecurityLevel::Strict => Self::strict(),
            SecurityLevel::Permissive => Self::permissive(),
        }
    }

    /// Create a permissive profile (for trusted code)
    pub fn permissive() -> Self {
        Self {
            drop_caps: vec![],
            add_caps: vec![],
            user: None,
            no_new_privileges: false,
            read_only: false,
        }
    }

    /// Create a strict profile (for untrusted code)
    pub fn strict() -> Self {
        Self {
            drop_caps: vec!["ALL".to_string()],
            add_caps: vec![],
            user: Some("65534:65534".to_string()), // nobody
            no_new_privileges: true,
            read_only: true,
        }
    }
}

/// Container runner configuration
#[derive(Debug, Clone)]
pub struct ContainerRunnerConfig {
    pub endpoint: DockerEndpoint,
    /// Image used when the request does not name one
    pub image: String,
    pub network: NetworkMode,
    pub pids_limit: i64,
    /// Pull the image when it is not present locally
    pub pull_missing: bool,
    /// Bound on the reachability ping
    pub connect_timeout: Duration,
    /// Fractional CPU share, unlimited when `None`
    pub cpus: Option<f64>,
    pub security: SecurityProfile,
}

impl Default for ContainerRunnerConfig {
    fn default() -> Self {
        Self::from_settings(&ContainerSettings::default())
    }
}

impl ContainerRunnerConfig {
    pub fn from_settings(settings: &ContainerSettings) -> Self {
        Self {
            endpoint: DockerEndpoint::LocalDefaults,
            image: settings.image.clone(),
            network: settings.network.clone(),
            pids_limit: settings.pids_limit,
            pull_missing: settings.pull_missing,
            connect_timeout: settings.connect_timeout(),
            cpus: settings.cpus,
            security: SecurityProfile::for_level(settings.security),
        }
    }

    pub fn with_endpoint(mut self, endpoint: DockerEndpoint) -> Self {
        self.endpoint = endpoint;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_security(mut self, security: SecurityProfile) -> Self {
        self.security = security;
        self
    }

    pub fn with_network(mut self, network: NetworkMode) -> Self {
        self.network = network;
        self
    }

    /// Build the create-container body for one command
    pub fn container_config(
        &self,
        image: &str,
        argv: Vec<String>,
        limits: &ResourceLimits,
        mounts: Vec<Mount>,
    ) -> Config<String> {
        let cpu_seconds = i64::try_from(limits.cpu_seconds).unwrap_or(i64::MAX);
        let memory = i64::try_from(limits.memory_bytes).unwrap_or(i64::MAX);

        let mut security_opt = Vec::new();
        if self.security.no_new_privileges {
            security_opt.push("no-new-privileges:true".to_string());
        }

        let host_config = HostConfig {
            memory: Some(memory),
            // Same as memory: no swap on top of the ceiling
            memory_swap: Some(memory),
            nano_cpus: self.cpus.map(|cpus| (cpus * 1_000_000_000.0) as i64),
            pids_limit: Some(self.pids_limit),
            ulimits: Some(vec![ResourcesUlimits {
                name: Some("cpu".to_string()),
                soft: Some(cpu_seconds),
                hard: Some(cpu_seconds),
            }]),
            network_mode: Some(self.network.as_docker_mode().to_string()),
            cap_drop: (!self.security.drop_caps.is_empty())
                .then(|| self.security.drop_caps.clone()),
            cap_add: (!self.security.add_caps.is_empty())
                .then(|| self.security.add_caps.clone()),
            security_opt: (!security_opt.is_empty()).then_some(security_opt),
            readonly_rootfs: Some(self.security.read_only),
            mounts: (!mounts.is_empty()).then_some(mounts),
            auto_remove: Some(false),
            ..Default::default()
        };

        let mut labels = HashMap::new();
        labels.insert(MANAGED_LABEL.to_string(), "true".to_string());

        Config {
            image: Some(image.to_string()),
            cmd: Some(argv),
            user: self.security.user.clone(),
            labels: Some(labels),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            tty: Some(false),
            network_disabled: Some(self.network == NetworkMode::None),
            host_config: Some(host_config),
            ..Default::default()
        }
    }
}

/// Docker-backed runner
#[derive(Debug, Clone, Default)]
pub struct ContainerRunner {
    config: ContainerRunnerConfig,
}

impl ContainerRunner {
    /// Create a new container runner with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with configuration
    pub fn with_config(config: ContainerRunnerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ContainerRunnerConfig {
        &self.config
    }

    /// Connect and ping; any failure means "not available"
    pub async fn connect(&self) -> Result<Docker, String> {
        let docker = match &self.config.endpoint {
            DockerEndpoint::LocalDefaults => Docker::connect_with_local_defaults(),
            #[cfg(unix)]
            DockerEndpoint::Unix(path) => {
                Docker::connect_with_unix(path, SOCKET_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
        }
        .map_err(|e| format!("cannot connect to container engine: {}", e))?;

        match tokio::time::timeout(self.config.connect_timeout, docker.ping()).await {
            Ok(Ok(_)) => Ok(docker),
            Ok(Err(e)) => Err(format!("container engine did not answer ping: {}", e)),
            Err(_) => Err(format!(
                "container engine ping timed out after {:.1}s",
                self.config.connect_timeout.as_secs_f64()
            )),
        }
    }

    /// Whether an engine is reachable right now
    pub async fn is_available(&self) -> bool {
        self.connect().await.is_ok()
    }

    async fn create_container(
        &self,
        docker: &Docker,
        name: &str,
        image: &str,
        config: Config<String>,
    ) -> Result<String, String> {
        let options = || CreateContainerOptions {
            name: name.to_string(),
            platform: None,
        };

        match docker
            .create_container(Some(options()), config.clone())
            .await
        {
            Ok(response) => Ok(response.id),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) if self.config.pull_missing => {
                info!(image, "Image not present locally, pulling");
                pull_image(docker, image).await?;
                docker
                    .create_container(Some(options()), config)
                    .await
                    .map(|response| response.id)
                    .map_err(|e| format!("failed to create container: {}", e))
            }
            Err(e) => Err(format!("failed to create container: {}", e)),
        }
    }

    /// Start, wait out the rest of the timeout, collect output. The caller
    /// tears down.
    async fn drive(
        &self,
        docker: &Docker,
        id: &str,
        timeout: Duration,
        started: Instant,
    ) -> ExecutionOutcome {
        let run = async {
            docker
                .start_container(id, None::<StartContainerOptions<String>>)
                .await
                .map_err(|e| format!("failed to start container: {}", e))?;
            wait_for_exit(docker, id).await
        };

        match tokio::time::timeout(time_left(timeout, started), run).await {
            Ok(Ok(code)) => {
                let (stdout, stderr) = collect_logs(docker, id).await;
                let outcome =
                    ExecutionOutcome::completed(code, stdout, stderr, started.elapsed());
                if code != 0 && was_oom_killed(docker, id).await {
                    return outcome.with_reason("memory limit exceeded (OOMKilled)");
                }
                outcome
            }
            Ok(Err(reason)) => {
                error!(container_id = id, %reason, "Running container failed");
                ExecutionOutcome::error(reason).with_duration(started.elapsed())
            }
            Err(_) => {
                error!(
                    container_id = id,
                    timeout_secs = timeout.as_secs_f64(),
                    "Container timeout"
                );
                if let Err(e) = docker
                    .kill_container(id, Some(KillContainerOptions { signal: "SIGKILL" }))
                    .await
                {
                    debug!(container_id = id, error = %e, "Kill after timeout failed");
                }
                let (stdout, stderr) = collect_logs(docker, id).await;
                ExecutionOutcome::timeout(timeout, stdout, stderr, started.elapsed())
            }
        }
    }
}

#[async_trait]
impl Runner for ContainerRunner {
    async fn run(&self, request: &RunRequest) -> ExecutionOutcome {
        let mut argv = match split_command(&request.command) {
            Ok(argv) => argv,
            Err(reason) => {
                warn!(command = %request.command, "{}", reason);
                return ExecutionOutcome::error(reason);
            }
        };

        let mut mounts = Vec::new();
        if let Some(script) = &request.script {
            match script_mount(&mut argv, script) {
                Ok(mount) => mounts.push(mount),
                Err(reason) => {
                    warn!(script = %script.display(), %reason, "Cannot mount script");
                    return ExecutionOutcome::error(reason);
                }
            }
        }

        let docker = match self.connect().await {
            Ok(docker) => docker,
            Err(reason) => {
                info!(%reason, "Container engine not available");
                return ExecutionOutcome::docker_not_available(reason);
            }
        };

        let image = request
            .image
            .clone()
            .unwrap_or_else(|| self.config.image.clone());
        let name = format!("warden-{}", &Uuid::new_v4().simple().to_string()[..8]);
        let config = self
            .config
            .container_config(&image, argv, &request.limits, mounts);
        let started = Instant::now();

        // Pull and create count against the same wall-clock bound
        let created = tokio::time::timeout(
            request.timeout,
            self.create_container(&docker, &name, &image, config),
        )
        .await;
        let id = match created {
            Ok(Ok(id)) => id,
            Ok(Err(reason)) => {
                error!(image = %image, %reason, "Container creation failed");
                return ExecutionOutcome::error(reason).with_duration(started.elapsed());
            }
            Err(_) => {
                error!(
                    image = %image,
                    timeout_secs = request.timeout.as_secs_f64(),
                    "Container setup timeout"
                );
                // Creation may have landed after the deadline
                remove_container(&docker, &name).await;
                let outcome =
                    ExecutionOutcome::timeout(request.timeout, "", "", started.elapsed());
                let reason = format!(
                    "{} while preparing the container",
                    outcome.reason.clone().unwrap_or_default()
                );
                return outcome.with_reason(reason);
            }
        };

        info!(
            container_id = %id,
            image = %image,
            command = %request.command,
            "Running command in container"
        );

        let guard = ContainerGuard::new(docker.clone(), id.clone());
        let outcome = self.drive(&docker, &id, request.timeout, started).await;
        guard.remove().await;

        debug!(
            container_id = %id,
            status = %outcome.status,
            duration_secs = outcome.duration_seconds,
            "Container finished"
        );
        outcome
    }

    fn name(&self) -> &'static str {
        "container"
    }
}

/// Removes its container when dropped, unless `remove` already ran
struct ContainerGuard {
    docker: Docker,
    id: Option<String>,
}

impl ContainerGuard {
    fn new(docker: Docker, id: String) -> Self {
        Self {
            docker,
            id: Some(id),
        }
    }

    async fn remove(mut self) {
        if let Some(id) = self.id.take() {
            remove_container(&self.docker, &id).await;
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(id) = self.id.take() else {
            return;
        };
        let docker = self.docker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move { remove_container(&docker, &id).await });
            }
            Err(_) => warn!(container_id = %id, "No runtime left to remove container"),
        }
    }
}

async fn remove_container(docker: &Docker, id: &str) {
    let options = RemoveContainerOptions {
        force: true,
        v: true,
        ..Default::default()
    };
    match docker.remove_container(id, Some(options)).await {
        Ok(()) => debug!(container_id = id, "Removed container"),
        Err(e) => warn!(container_id = id, error = %e, "Failed to remove container"),
    }
}

async fn wait_for_exit(docker: &Docker, id: &str) -> Result<i32, String> {
    let mut stream = docker.wait_container(
        id,
        Some(WaitContainerOptions {
            condition: "not-running",
        }),
    );
    match stream.next().await {
        Some(Ok(response)) => Ok(response.status_code as i32),
        // bollard reports non-zero exits as an error carrying the code
        Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code as i32),
        Some(Err(e)) => Err(format!("failed waiting for container: {}", e)),
        None => Err("container wait stream ended without a status".to_string()),
    }
}

async fn collect_logs(docker: &Docker, id: &str) -> (String, String) {
    let options = LogsOptions::<String> {
        stdout: true,
        stderr: true,
        follow: false,
        ..Default::default()
    };

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut stream = docker.logs(id, Some(options));

    let drain = async {
        while let Some(item) = stream.next().await {
            match item {
                Ok(LogOutput::StdOut { message }) | Ok(LogOutput::Console { message }) => {
                    stdout.extend_from_slice(&message)
                }
                Ok(LogOutput::StdErr { message }) => stderr.extend_from_slice(&message),
                Ok(LogOutput::StdIn { .. }) => {}
                Err(e) => {
                    warn!(container_id = id, error = %e, "Log stream error");
                    break;
                }
            }
        }
    };
    if tokio::time::timeout(LOG_COLLECT_TIMEOUT, drain).await.is_err() {
        warn!(container_id = id, "Log collection timed out, output truncated");
    }

    (
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
    )
}

async fn was_oom_killed(docker: &Docker, id: &str) -> bool {
    docker
        .inspect_container(id, None::<InspectContainerOptions>)
        .await
        .ok()
        .and_then(|info| info.state)
        .and_then(|state| state.oom_killed)
        .unwrap_or(false)
}

async fn pull_image(docker: &Docker, image: &str) -> Result<(), String> {
    let (from_image, tag) = split_image_reference(image);
    let options = CreateImageOptions {
        from_image: from_image.to_string(),
        tag: tag.to_string(),
        ..Default::default()
    };
    docker
        .create_image(Some(options), None, None)
        .try_collect::<Vec<_>>()
        .await
        .map(|_| ())
        .map_err(|e| format!("failed to pull image {}: {}", image, e))
}

/// Remaining share of `limit` since `started`
fn time_left(limit: Duration, started: Instant) -> Duration {
    limit.saturating_sub(started.elapsed())
}

/// Bind `script` read-only under [`SCRIPT_MOUNT_DIR`] and point argv at it
fn script_mount(argv: &mut [String], script: &Path) -> Result<Mount, String> {
    let host = std::fs::canonicalize(script)
        .map_err(|e| format!("cannot resolve script {}: {}", script.display(), e))?;
    let file_name = host
        .file_name()
        .ok_or_else(|| format!("script path has no file name: {}", host.display()))?;
    let target = format!("{}/{}", SCRIPT_MOUNT_DIR, file_name.to_string_lossy());

    let original = script.to_string_lossy();
    for arg in argv.iter_mut().filter(|arg| **arg == original) {
        *arg = target.clone();
    }

    Ok(Mount {
        target: Some(target),
        source: Some(host.to_string_lossy().into_owned()),
        typ: Some(MountTypeEnum::BIND),
        read_only: Some(true),
        ..Default::default()
    })
}

/// Split `repo[:tag]` / `repo@digest`; a bare repo pulls `latest`
fn split_image_reference(image: &str) -> (&str, &str) {
    if image.contains('@') {
        return (image, "");
    }
    let last_segment_start = image.rfind('/').map(|i| i + 1).unwrap_or(0);
    match image[last_segment_start..].rfind(':') {
        Some(colon) => {
            let split = last_segment_start + colon;
            (&image[..split], &image[split + 1..])
        }
        None => (image, "latest"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::limits::ResourceLimiter;
    use crate::outcome::ExecutionStatus;

    #[test]
    fn test_container_config_limits() {
        let config = ContainerRunnerConfig::default();
        let limits = ResourceLimiter::new(3, 256 * 1024 * 1024).unwrap().build();
        let body = config.container_config(
            "python:3.12-slim",
            vec!["echo".to_string(), "hello".to_string()],
            &limits,
            Vec::new(),
        );

        assert_eq!(body.image.as_deref(), Some("python:3.12-slim"));
        assert_eq!(body.cmd, Some(vec!["echo".to_string(), "hello".to_string()]));
        assert_eq!(body.network_disabled, Some(true));

        let labels = body.labels.unwrap();
        assert_eq!(labels.get(MANAGED_LABEL).map(String::as_str), Some("true"));

        let host = body.host_config.unwrap();
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.memory_swap, Some(256 * 1024 * 1024));
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.pids_limit, Some(256));
        assert_eq!(host.auto_remove, Some(false));
        assert!(host.nano_cpus.is_none());
        assert!(host.mounts.is_none());

        let ulimits = host.ulimits.unwrap();
        assert_eq!(ulimits.len(), 1);
        assert_eq!(ulimits[0].name.as_deref(), Some("cpu"));
        assert_eq!(ulimits[0].soft, Some(3));
        assert_eq!(ulimits[0].hard, Some(3));

        assert_eq!(host.cap_drop, Some(vec!["ALL".to_string()]));
        assert!(host.cap_add.is_none());
        assert_eq!(
            host.security_opt,
            Some(vec!["no-new-privileges:true".to_string()])
        );
    }

    #[test]
    fn test_container_config_permissive_bridge() {
        let mut config = ContainerRunnerConfig::default()
            .with_security(SecurityProfile::permissive())
            .with_network(NetworkMode::Bridge);
        config.cpus = Some(0.5);

        let body = config.container_config(
            "alpine",
            vec!["true".to_string()],
            &ResourceLimiter::default().build(),
            Vec::new(),
        );
        assert_eq!(body.network_disabled, Some(false));
        assert!(body.user.is_none());

        let host = body.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("bridge"));
        assert_eq!(host.nano_cpus, Some(500_000_000));
        assert!(host.cap_drop.is_none());
        assert!(host.security_opt.is_none());
    }

    #[test]
    fn test_security_profiles() {
        let strict = SecurityProfile::strict();
        assert!(strict.no_new_privileges);
        assert!(strict.read_only);
        assert!(strict.drop_caps.contains(&"ALL".to_string()));

        let permissive = SecurityProfile::permissive();
        assert!(!permissive.no_new_privileges);
        assert!(permissive.drop_caps.is_empty());
    }

    #[test]
    fn test_split_image_reference() {
        assert_eq!(
            split_image_reference("python:3.12-slim"),
            ("python", "3.12-slim")
        );
        assert_eq!(split_image_reference("alpine"), ("alpine", "latest"));
        assert_eq!(
            split_image_reference("localhost:5000/tools/runner"),
            ("localhost:5000/tools/runner", "latest")
        );
        assert_eq!(
            split_image_reference("localhost:5000/tools/runner:v2"),
            ("localhost:5000/tools/runner", "v2")
        );
        assert_eq!(
            split_image_reference("alpine@sha256:abcd"),
            ("alpine@sha256:abcd", "")
        );
    }

    #[test]
    fn test_from_settings() {
        let settings = ContainerSettings {
            image: "busybox:1.36".to_string(),
            pull_missing: false,
            ..Default::default()
        };
        let config = ContainerRunnerConfig::from_settings(&settings);
        assert_eq!(config.image, "busybox:1.36");
        assert!(!config.pull_missing);
        assert_eq!(config.endpoint, DockerEndpoint::LocalDefaults);
        assert_eq!(config.security.user.as_deref(), Some("1000:1000"));
        assert!(!config.security.read_only);
        assert_eq!(ContainerRunnerConfig::default().image, "python:3.12-slim");
    }

    #[test]
    fn test_from_settings_selects_security_level() {
        let strict = ContainerRunnerConfig::from_settings(&ContainerSettings {
            security: SecurityLevel::Strict,
            ..Default::default()
        });
        assert!(strict.security.read_only);
        assert_eq!(strict.security.user.as_deref(), Some("65534:65534"));

        let body = strict.container_config(
            "alpine",
            vec!["true".to_string()],
            &ResourceLimiter::default().build(),
            Vec::new(),
        );
        assert_eq!(body.host_config.unwrap().readonly_rootfs, Some(true));

        let permissive = ContainerRunnerConfig::from_settings(&ContainerSettings {
            security: SecurityLevel::Permissive,
            ..Default::default()
        });
        assert!(permissive.security.drop_caps.is_empty());
        assert!(!permissive.security.no_new_privileges);
    }

    #[test]
    fn test_script_is_bind_mounted_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("job.sh");
        std::fs::write(&script, "echo hi\n").unwrap();

        let host_path = script.to_string_lossy().into_owned();
        let mut argv = vec!["bash".to_string(), host_path];
        let mount = script_mount(&mut argv, &script).unwrap();

        let target = format!("{}/job.sh", SCRIPT_MOUNT_DIR);
        assert_eq!(argv, vec!["bash".to_string(), target.clone()]);
        assert_eq!(mount.target.as_deref(), Some(target.as_str()));
        assert_eq!(mount.typ, Some(MountTypeEnum::BIND));
        assert_eq!(mount.read_only, Some(true));
        let source = std::fs::canonicalize(&script).unwrap();
        assert_eq!(mount.source.as_deref(), Some(source.to_string_lossy().as_ref()));

        let body = ContainerRunnerConfig::default().container_config(
            "alpine",
            argv,
            &ResourceLimiter::default().build(),
            vec![mount],
        );
        assert_eq!(body.cmd, Some(vec!["bash".to_string(), target]));
        let mounts = body.host_config.unwrap().mounts.unwrap();
        assert_eq!(mounts.len(), 1);
    }

    #[test]
    fn test_missing_script_cannot_be_mounted() {
        let mut argv = vec!["bash".to_string(), "/nonexistent/job.sh".to_string()];
        let err = script_mount(&mut argv, Path::new("/nonexistent/job.sh")).unwrap_err();
        assert!(err.contains("/nonexistent/job.sh"));
        assert_eq!(argv[1], "/nonexistent/job.sh");
    }

    #[test]
    fn test_time_left_saturates() {
        let started = Instant::now();
        assert!(time_left(Duration::from_secs(60), started) > Duration::from_secs(59));
        assert_eq!(time_left(Duration::ZERO, started), Duration::ZERO);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreachable_engine_is_not_available() {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("docker.sock");
        let runner = ContainerRunner::with_config(
            ContainerRunnerConfig::default()
                .with_endpoint(DockerEndpoint::Unix(socket.to_string_lossy().into_owned())),
        );

        assert!(!runner.is_available().await);

        let request = RunRequest::new(
            "echo hello",
            ResourceLimiter::default().build(),
            Duration::from_secs(5),
        );
        let outcome = runner.run(&request).await;
        assert_eq!(outcome.status, ExecutionStatus::DockerNotAvailable);
        assert!(outcome.reason.is_some());
        assert_eq!(runner.name(), "container");
    }

    #[tokio::test]
    async fn test_malformed_command_checked_before_engine() {
        let runner = ContainerRunner::new();
        let request = RunRequest::new(
            "echo \"unterminated",
            ResourceLimiter::default().build(),
            Duration::from_secs(5),
        );
        let outcome = runner.run(&request).await;
        assert_eq!(outcome.status, ExecutionStatus::Error);
    }
}
