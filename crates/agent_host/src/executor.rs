//! Command executor for suggestions the user has confirmed.
//!
//! Commands run through the system shell exactly as given: no sandbox, no
//! timeout, no output cap. Redaction is cosmetic and applies to what is
//! displayed only.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

/// Filenames stripped from displayed output.
pub const REDACTED_NAMES: &[&str] = &["dump.rdb"];

/// Result of command execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandOutput {
    /// The command that was run
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    /// -1 when the process was killed by a signal
    pub exit_code: i32,
    pub success: bool,
    pub duration_ms: u64,
}

impl CommandOutput {
    /// Human-readable failure description, `None` on success.
    pub fn error(&self) -> Option<String> {
        if self.success {
            return None;
        }
        let stderr = redact(self.stderr.trim());
        if stderr.is_empty() {
            Some(format!("exit status {}", self.exit_code))
        } else {
            Some(format!("exit status {}: {}", self.exit_code, stderr))
        }
    }

    /// Stdout as it should be shown to the user.
    pub fn display_stdout(&self) -> String {
        redact(&self.stdout)
    }
}

/// Remove every occurrence of the sensitive names, keeping everything else.
pub fn redact(text: &str) -> String {
    REDACTED_NAMES
        .iter()
        .fold(text.to_string(), |acc, name| acc.replace(name, ""))
}

/// Runs a confirmed command.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput>;
}

/// Runs commands with `sh -c` (`cmd /C` on Windows).
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        execute_command(command).await
    }
}

/// Execute a command and return structured result
pub async fn execute_command(cmd: &str) -> Result<CommandOutput> {
    let start = Instant::now();

    // Determine shell based on OS
    let (shell, shell_arg) = if cfg!(windows) {
        ("cmd", "/C")
    } else {
        ("sh", "-c")
    };

    let output = Command::new(shell)
        .arg(shell_arg)
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let duration_ms = start.elapsed().as_millis() as u64;
    let result = CommandOutput {
        command: cmd.to_string(),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
        success: output.status.success(),
        duration_ms,
    };
    tracing::info!(
        command = %cmd,
        exit_code = result.exit_code,
        duration_ms,
        "command finished"
    );
    Ok(result)
}
