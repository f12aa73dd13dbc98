//! Shell-command gate evaluator.
//!
//! The content under review arrives on stdin; gate authors read event
//! details from the `HOOK_*` environment variables. Exit code 0 passes,
//! anything else fails with trimmed stderr as the feedback.

use std::path::PathBuf;
use std::process::Stdio;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{HookConfig, HookContext, HookEvaluator, HookOutcome};

/// Runs a gate as a shell command in a configured working directory.
pub struct CommandEvaluator {
    workdir: PathBuf,
}

impl CommandEvaluator {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl HookEvaluator for CommandEvaluator {
    async fn evaluate(&self, hook: &HookConfig, ctx: &HookContext) -> Result<HookOutcome> {
        let command = hook
            .command
            .as_deref()
            .context("command hook has no command configured")?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .env("HOOK_EVENT", &ctx.event)
            .env("HOOK_SOURCE_AGENT", &ctx.source_agent)
            .env("HOOK_TARGET_AGENT", &ctx.target_agent)
            .env("HOOK_TASK", &ctx.task)
            .env("HOOK_USER_ID", &ctx.user_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn hook command: {}", command))?;

        // The stdin write shares the timeout budget: a command that never
        // reads its stdin must not stall the evaluator past the deadline.
        let stdin = child.stdin.take();
        let write_stdin = async {
            if let Some(mut stdin) = stdin {
                if let Err(e) = stdin.write_all(ctx.content.as_bytes()).await {
                    warn!(error = %e, "Failed to write content to hook stdin");
                }
                // Drop stdin to close it
            }
        };
        let run = async {
            let (_, output) = tokio::join!(write_stdin, child.wait_with_output());
            output
        };

        let timeout = hook.timeout();
        let output = match tokio::time::timeout(timeout, run).await {
            Ok(result) => result.context("hook command execution failed")?,
            Err(_) => {
                // kill_on_drop reaps the abandoned child.
                warn!(
                    command,
                    timeout_secs = timeout.as_secs(),
                    "Hook command timed out"
                );
                return Ok(HookOutcome::fail(format!(
                    "hook command timed out after {}s",
                    timeout.as_secs()
                )));
            }
        };

        let exit_code = output.status.code().unwrap_or(-1);
        let stderr = String::from_utf8_lossy(&output.stderr);
        debug!(
            command,
            exit_code,
            stderr_len = stderr.len(),
            "Hook command completed"
        );

        if output.status.success() {
            return Ok(HookOutcome::pass());
        }

        let feedback = if stderr.trim().is_empty() {
            format!("command exited with error (code {})", exit_code)
        } else {
            stderr.trim().to_string()
        };
        Ok(HookOutcome::fail(feedback))
    }
}
