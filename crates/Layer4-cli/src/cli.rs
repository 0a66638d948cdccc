//! Subcommand handlers

use std::process::ExitCode;
use std::time::Duration;
use warden_foundation::{Result, WardenConfig};
use warden_task::{ExecutionOutcome, Executor, Policy, PolicyIssue};

/// Print the outcome as JSON; exit 0 only for `ok`
pub fn report(outcome: &ExecutionOutcome) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(outcome)?);
    Ok(if outcome.is_ok() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub async fn run_command(
    config: &WardenConfig,
    command: &str,
    timeout: Option<u64>,
    no_policy: bool,
    container: bool,
    image: Option<&str>,
) -> anyhow::Result<ExitCode> {
    let executor = Executor::from_config(config)?;
    let timeout = timeout.map(Duration::from_secs);

    let outcome = if container {
        executor.run_in_container(command, image, timeout).await
    } else {
        executor.run(command, timeout, !no_policy).await
    };
    report(&outcome)
}

pub async fn run_script(
    config: &WardenConfig,
    path: &str,
    timeout: Option<u64>,
) -> anyhow::Result<ExitCode> {
    let executor = Executor::from_config(config)?;
    let outcome = executor
        .run_script(path, timeout.map(Duration::from_secs))
        .await;
    report(&outcome)
}

/// Lint the policy file; fails on entries that match everything
pub fn policy_check(config: &WardenConfig) -> anyhow::Result<ExitCode> {
    let path = &config.policy_path;
    let policy = match Policy::load_required(path) {
        Ok(policy) => policy,
        Err(e) => {
            eprintln!("✗ {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    let issues = policy.lint();
    println!(
        "{}: {} command entries, {} script suffixes",
        path.display(),
        policy
            .allowed_actions
            .iter()
            .map(|entry| entry.commands.len())
            .sum::<usize>(),
        policy.whitelisted_scripts.len()
    );

    if issues.is_empty() {
        println!("✓ no issues");
        return Ok(ExitCode::SUCCESS);
    }
    for issue in &issues {
        let marker = if issue.is_match_all() { "✗" } else { "·" };
        println!("{} {}", marker, issue);
    }
    Ok(if issues.iter().any(PolicyIssue::is_match_all) {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Print the policy the executor would use
pub fn policy_show(config: &WardenConfig) -> anyhow::Result<ExitCode> {
    let policy = load_for_show(config)?;
    println!("{}", serde_json::to_string_pretty(&policy)?);
    Ok(ExitCode::SUCCESS)
}

fn load_for_show(config: &WardenConfig) -> Result<Policy> {
    if config.policy_required {
        Policy::load_required(&config.policy_path)
    } else {
        Ok(Policy::load(&config.policy_path))
    }
}
