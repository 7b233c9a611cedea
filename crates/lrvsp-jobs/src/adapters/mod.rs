//! Built-in extractors.

pub mod command;
pub mod pdf_text;
pub mod text_native;

pub use command::CommandExtractor;
pub use pdf_text::PdfTextAdapter;
pub use text_native::TextNativeAdapter;

use std::time::Duration;

use lrvsp_core::{Error, Result};
use tokio::process::Command;

/// Run a command with a timeout, returning stdout as a string.
pub(crate) async fn run_cmd_with_timeout(cmd: &mut Command, timeout: Duration) -> Result<String> {
    let output = tokio::time::timeout(timeout, cmd.kill_on_drop(true).output())
        .await
        .map_err(|_| {
            Error::Extraction(format!(
                "External command timed out after {}s",
                timeout.as_secs()
            ))
        })?
        .map_err(|e| Error::Extraction(format!("Failed to execute command: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(Error::Extraction(format!(
            "Command failed ({}): {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_cmd_captures_stdout() {
        let out = run_cmd_with_timeout(
            Command::new("sh").arg("-c").arg("printf hello"),
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_run_cmd_nonzero_exit_is_extraction_error() {
        let err = run_cmd_with_timeout(
            Command::new("sh").arg("-c").arg("echo broken >&2; exit 3"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Extraction(ref msg) if msg.contains("broken")));
    }

    #[tokio::test]
    async fn test_run_cmd_missing_program() {
        let err = run_cmd_with_timeout(
            &mut Command::new("/nonexistent/lrvsp-helper"),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("Failed to execute command"));
    }

    #[tokio::test]
    async fn test_run_cmd_times_out() {
        let err = run_cmd_with_timeout(
            Command::new("sh").arg("-c").arg("sleep 5"),
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
