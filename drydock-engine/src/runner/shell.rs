// Shell Runner
// Runs step actions as shell commands with piped output and timeouts

use crate::parser::models::StepSpec;
use crate::runner::{RunnerError, StepExecution, StepRunner};

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

/// Runs each step action as a shell command (`sh -c` on Unix, `cmd /C` on
/// Windows). The timeout covers the whole action; on expiry the child is
/// killed and the step reports failure. A spawn failure means the step
/// never ran, so it surfaces as `Unavailable` rather than a step result.
pub struct ShellRunner;

impl ShellRunner {
    pub fn new() -> Self {
        Self
    }

    fn shell_command() -> (&'static str, &'static str) {
        if cfg!(target_os = "windows") {
            ("cmd", "/C")
        } else {
            ("sh", "-c")
        }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn run(
        &self,
        step: &StepSpec,
        env: &HashMap<String, String>,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<StepExecution, RunnerError> {
        let (shell, flag) = Self::shell_command();

        let mut cmd = Command::new(shell);
        cmd.arg(flag);
        cmd.arg(&step.action);
        cmd.current_dir(working_dir);
        cmd.envs(env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| RunnerError::Unavailable {
            reason: format!("failed to spawn '{}': {}", shell, e),
        })?;

        let stdout = child.stdout.take().expect("stdout was piped");
        let stderr = child.stderr.take().expect("stderr was piped");

        let stdout_handle = tokio::spawn(collect_lines(BufReader::new(stdout)));
        let stderr_handle = tokio::spawn(collect_lines(BufReader::new(stderr)));

        let wait_result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
                Ok(result) => result,
                Err(_) => {
                    let _ = child.kill().await;
                    return Ok(StepExecution {
                        success: false,
                        output: stdout_handle.await.unwrap_or_default(),
                        error: Some(format!(
                            "step '{}' timed out after {:?}",
                            step.name, limit
                        )),
                        exit_code: None,
                    });
                }
            },
            None => child.wait().await,
        };

        let exit_code = wait_result.ok().and_then(|s| s.code());
        let output = stdout_handle.await.unwrap_or_default();
        let stderr_output = stderr_handle.await.unwrap_or_default();

        let success = exit_code == Some(0);
        Ok(StepExecution {
            success,
            output,
            error: if stderr_output.is_empty() {
                None
            } else {
                Some(stderr_output)
            },
            exit_code,
        })
    }
}

async fn collect_lines<R>(reader: BufReader<R>) -> String
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    let mut output = String::new();
    while let Ok(Some(line)) = lines.next_line().await {
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&line);
    }
    output
}
