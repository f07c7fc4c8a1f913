// Step Runners
// Collaborator interface for dispatching step actions to build tooling

pub mod shell;

pub use shell::ShellRunner;

use crate::parser::models::StepSpec;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Result of dispatching one step action
#[derive(Debug, Clone)]
pub struct StepExecution {
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
}

impl StepExecution {
    pub fn succeeded(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: None,
            exit_code: Some(0),
        }
    }

    pub fn failed(error: impl Into<String>, exit_code: Option<i32>) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error.into()),
            exit_code,
        }
    }
}

/// Errors from a step runner
#[derive(Debug, Clone, Error)]
pub enum RunnerError {
    /// The runner itself could not dispatch the step. Distinct from the
    /// step running and failing, which is a `StepExecution`.
    #[error("runner unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Dispatches step actions to the underlying build tooling.
///
/// The executor only sees the interface; what "running a step" means is
/// entirely the runner's business. Timeout enforcement belongs to the
/// runner so a timed-out action is reaped, not abandoned.
#[async_trait]
pub trait StepRunner: Send + Sync {
    async fn run(
        &self,
        step: &StepSpec,
        env: &HashMap<String, String>,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<StepExecution, RunnerError>;
}

/// Wraps a runner with bounded retries for dispatch failures.
///
/// Only `Unavailable` is retried; a step that ran and failed is a real
/// result and is never re-run.
pub struct RetryingRunner<R> {
    inner: R,
    max_attempts: u32,
    backoff: Duration,
}

impl<R> RetryingRunner<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }
}

#[async_trait]
impl<R: StepRunner> StepRunner for RetryingRunner<R> {
    async fn run(
        &self,
        step: &StepSpec,
        env: &HashMap<String, String>,
        working_dir: &Path,
        timeout: Option<Duration>,
    ) -> Result<StepExecution, RunnerError> {
        let mut attempt = 1;
        loop {
            match self.inner.run(step, env, working_dir, timeout).await {
                Ok(execution) => return Ok(execution),
                Err(err @ RunnerError::Unavailable { .. }) => {
                    if attempt >= self.max_attempts {
                        return Err(err);
                    }
                    tracing::warn!(step = %step.name, attempt, "runner unavailable, retrying");
                    tokio::time::sleep(self.backoff * attempt).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn step(action: &str) -> StepSpec {
        StepSpec {
            name: "step".to_string(),
            action: action.to_string(),
            continue_on_error: false,
            env: HashMap::new(),
            timeout_in_minutes: None,
        }
    }

    /// Runner that fails dispatch for the first N calls
    struct FlakyRunner {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl StepRunner for FlakyRunner {
        async fn run(
            &self,
            _step: &StepSpec,
            _env: &HashMap<String, String>,
            _working_dir: &Path,
            _timeout: Option<Duration>,
        ) -> Result<StepExecution, RunnerError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err(RunnerError::Unavailable {
                    reason: "worker pool draining".to_string(),
                })
            } else {
                Ok(StepExecution::succeeded("ok"))
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_runner_recovers() {
        let runner = RetryingRunner::new(FlakyRunner {
            failures: 2,
            calls: AtomicU32::new(0),
        });

        let env = HashMap::new();
        let execution = runner
            .run(&step("cargo check"), &env, Path::new("."), None)
            .await
            .unwrap();

        assert!(execution.success);
        assert_eq!(runner.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retrying_runner_exhausts_attempts() {
        let runner = RetryingRunner::new(FlakyRunner {
            failures: 10,
            calls: AtomicU32::new(0),
        })
        .with_max_attempts(2);

        let env = HashMap::new();
        let err = runner
            .run(&step("cargo check"), &env, Path::new("."), None)
            .await
            .unwrap_err();

        assert!(matches!(err, RunnerError::Unavailable { .. }));
        assert_eq!(runner.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_execution_is_not_retried() {
        struct FailingRunner(AtomicU32);

        #[async_trait]
        impl StepRunner for FailingRunner {
            async fn run(
                &self,
                _step: &StepSpec,
                _env: &HashMap<String, String>,
                _working_dir: &Path,
                _timeout: Option<Duration>,
            ) -> Result<StepExecution, RunnerError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(StepExecution::failed("compile error", Some(101)))
            }
        }

        let runner = RetryingRunner::new(FailingRunner(AtomicU32::new(0)));
        let env = HashMap::new();
        let execution = runner
            .run(&step("cargo check"), &env, Path::new("."), None)
            .await
            .unwrap();

        assert!(!execution.success);
        assert_eq!(runner.inner.0.load(Ordering::SeqCst), 1);
    }
}
