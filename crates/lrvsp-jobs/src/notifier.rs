//! Downstream trigger run after every batch.
//!
//! The content system materializes committed documents when its CLI is run
//! with a capacity limit (`drush lrvsCheck-db 1200` by default). The trigger
//! is best effort: a failure is logged and the cycle carries on.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use lrvsp_core::defaults::{DOWNSTREAM_SUBCOMMAND, DRUPAL_PATH, DRUSH_RELATIVE_PATH};
use lrvsp_core::{DownstreamNotifier, Error, NotifyOutcome};

/// Runs `<program> <subcommand> <capacity_limit>` and waits for it to exit.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandNotifier {
    program: PathBuf,
    subcommand: String,
    timeout: Option<Duration>,
}

impl CommandNotifier {
    pub fn new(program: impl Into<PathBuf>, subcommand: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            subcommand: subcommand.into(),
            timeout: None,
        }
    }

    /// The drush binary of the Drupal installation at `drupal_path`.
    pub fn drush(drupal_path: impl AsRef<Path>) -> Self {
        Self::new(
            drupal_path.as_ref().join(DRUSH_RELATIVE_PATH),
            DOWNSTREAM_SUBCOMMAND,
        )
    }

    /// Create from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `DRUPAL_PATH` | `/var/www/drupal` | Drupal installation root |
    /// | `DOWNSTREAM_TOOL` | `${DRUPAL_PATH}/vendor/bin/drush` | Trigger program |
    /// | `DOWNSTREAM_SUBCOMMAND` | `lrvsCheck-db` | Trigger subcommand |
    /// | `NOTIFY_TIMEOUT_SECS` | unset | Kill the trigger after this long |
    pub fn from_env() -> Self {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| var(name).filter(|v| !v.trim().is_empty());

        let drupal_path = non_empty("DRUPAL_PATH").unwrap_or_else(|| DRUPAL_PATH.to_string());
        let mut notifier = match non_empty("DOWNSTREAM_TOOL") {
            Some(tool) => Self::new(tool, DOWNSTREAM_SUBCOMMAND),
            None => Self::drush(drupal_path),
        };
        if let Some(subcommand) = non_empty("DOWNSTREAM_SUBCOMMAND") {
            notifier.subcommand = subcommand;
        }
        notifier.timeout = non_empty("NOTIFY_TIMEOUT_SECS")
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs);
        notifier
    }

    /// Kill the trigger if it runs longer than this.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn subcommand(&self) -> &str {
        &self.subcommand
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn failed(&self, exit_code: Option<i32>, message: String) -> NotifyOutcome {
        let err = Error::Downstream(message.clone());
        error!(
            subsystem = "jobs",
            component = "notifier",
            program = %self.program.display(),
            exit_code = ?exit_code,
            error = %err,
            "Downstream trigger failed"
        );
        NotifyOutcome::Failed { exit_code, message }
    }
}

#[async_trait]
impl DownstreamNotifier for CommandNotifier {
    async fn notify(&self, capacity_limit: u32) -> NotifyOutcome {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.subcommand)
            .arg(capacity_limit.to_string())
            .kill_on_drop(true);

        let output = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, cmd.output()).await {
                Ok(output) => output,
                Err(_) => {
                    return self.failed(None, format!("timed out after {}s", limit.as_secs()))
                }
            },
            None => cmd.output().await,
        };

        match output {
            Ok(output) if output.status.success() => {
                info!(
                    subsystem = "jobs",
                    component = "notifier",
                    capacity_limit,
                    "Downstream trigger finished"
                );
                debug!(
                    subsystem = "jobs",
                    component = "notifier",
                    stdout = %String::from_utf8_lossy(&output.stdout).trim(),
                    "Downstream trigger output"
                );
                NotifyOutcome::Succeeded
            }
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                self.failed(
                    output.status.code(),
                    format!("exited with {}: {}", output.status, stderr),
                )
            }
            Err(e) => self.failed(None, format!("failed to start: {}", e)),
        }
    }
}

/// Notifier for runs where the content system should not be triggered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpNotifier;

#[async_trait]
impl DownstreamNotifier for NoOpNotifier {
    async fn notify(&self, capacity_limit: u32) -> NotifyOutcome {
        debug!(capacity_limit, "Downstream trigger disabled, skipping");
        NotifyOutcome::Skipped
    }
}
