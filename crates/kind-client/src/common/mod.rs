//! Common utilities for the command-line clients
//!
//! Both clients drive an external binary and parse its standard output.

use crate::error::KindError;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs a binary to completion and returns its standard output.
///
/// A non-zero exit status is turned into [`KindError::CommandFailed`] with the
/// captured standard error attached.
pub async fn run_command(binary: &str, args: &[&str]) -> Result<String, KindError> {
    let command = render(binary, args);
    debug!("Running {}", command);

    let output = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|source| KindError::Io {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(KindError::CommandFailed {
            command,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|e| KindError::InvalidOutput {
        command,
        reason: format!("stdout is not UTF-8: {}", e),
    })
}

/// Splits command output into trimmed, non-empty lines
pub fn non_empty_lines(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn render(binary: &str, args: &[&str]) -> String {
    let mut command = binary.to_string();
    for arg in args {
        command.push(' ');
        command.push_str(arg);
    }
    command
}
