//! Warden CLI - Main entry point

mod cli;
mod logging;

use clap::{Parser, Subcommand};
use logging::{LogFormat, LogOptions};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::warn;
use warden_foundation::WardenConfig;

/// Warden - run commands through a fail-closed allow-list under resource limits
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Config file (default: ./warden.toml, or $WARDEN_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Policy file, overrides the configured path
    #[arg(long, global = true)]
    policy: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Log line format
    #[arg(long, value_enum, default_value_t = LogFormat::Text, global = true)]
    log_format: LogFormat,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a command if the policy allows it
    Run {
        /// Command line, split with shell quoting rules (no shell)
        command: String,
        /// Wall-clock timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Skip the policy check
        #[arg(long)]
        no_policy: bool,
        /// Run inside an ephemeral container
        #[arg(long)]
        container: bool,
        /// Container image
        #[arg(long, requires = "container")]
        image: Option<String>,
    },
    /// Run a whitelisted script with bash
    Script {
        path: String,
        /// Wall-clock timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },
    /// Inspect the policy file
    Policy {
        #[command(subcommand)]
        action: PolicyAction,
    },
}

#[derive(Subcommand, Debug)]
enum PolicyAction {
    /// Report empty or unknown entries
    Check,
    /// Print the loaded policy as JSON
    Show,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    // Initialize logging
    let fallback = logging::init(&LogOptions {
        debug: args.debug,
        format: args.log_format,
        file: args.log_file.clone(),
    });
    if let Some(message) = fallback {
        eprintln!("Warning: {}", message);
        warn!("{}", message);
    }

    // Load configuration
    let explicit = args
        .config
        .clone()
        .or_else(|| std::env::var_os("WARDEN_CONFIG").map(PathBuf::from));
    let mut config = WardenConfig::load(explicit.as_deref())?;
    if let Some(policy) = args.policy {
        config = config.with_policy_path(policy);
    }

    match args.command {
        Command::Run {
            command,
            timeout,
            no_policy,
            container,
            image,
        } => {
            cli::run_command(
                &config,
                &command,
                timeout,
                no_policy,
                container,
                image.as_deref(),
            )
            .await
        }
        Command::Script { path, timeout } => cli::run_script(&config, &path, timeout).await,
        Command::Policy { action } => match action {
            PolicyAction::Check => cli::policy_check(&config),
            PolicyAction::Show => cli::policy_show(&config),
        },
    }
}
