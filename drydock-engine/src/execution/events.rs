// Execution Events
// Progress reporting channel for pipeline runs

use crate::execution::status::{JobOutcome, StageOutcome, StepOutcome};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Pipeline execution started
    PipelineStarted {
        pipeline_name: String,
        total_stages: usize,
    },

    /// Pipeline execution completed
    PipelineCompleted {
        pipeline_name: String,
        success: bool,
        duration: Duration,
    },

    /// Stage execution started
    StageStarted {
        stage_name: String,
        display_name: Option<String>,
        total_jobs: usize,
    },

    /// Stage execution completed
    StageCompleted {
        stage_name: String,
        outcome: StageOutcome,
        duration: Duration,
    },

    /// Stage never ran because a dependency was unacceptable
    StageSkipped {
        stage_name: String,
        blocking_dependency: String,
    },

    /// Job execution started
    JobStarted {
        stage_name: String,
        job_name: String,
        display_name: Option<String>,
        total_steps: usize,
    },

    /// Job execution completed
    JobCompleted {
        stage_name: String,
        job_name: String,
        outcome: JobOutcome,
        duration: Duration,
    },

    /// Step execution started
    StepStarted {
        stage_name: String,
        job_name: String,
        step_name: String,
        step_index: usize,
    },

    /// Step output (stdout/stderr)
    StepOutput {
        stage_name: String,
        job_name: String,
        step_name: String,
        output: String,
        is_error: bool,
    },

    /// Step execution completed
    StepCompleted {
        stage_name: String,
        job_name: String,
        step_name: String,
        step_index: usize,
        outcome: StepOutcome,
        duration: Duration,
        exit_code: Option<i32>,
    },
}

impl ExecutionEvent {
    pub fn pipeline_started(name: impl Into<String>, total_stages: usize) -> Self {
        Self::PipelineStarted {
            pipeline_name: name.into(),
            total_stages,
        }
    }

    pub fn pipeline_completed(name: impl Into<String>, success: bool, duration: Duration) -> Self {
        Self::PipelineCompleted {
            pipeline_name: name.into(),
            success,
            duration,
        }
    }

    pub fn stage_started(
        name: impl Into<String>,
        display_name: Option<String>,
        total_jobs: usize,
    ) -> Self {
        Self::StageStarted {
            stage_name: name.into(),
            display_name,
            total_jobs,
        }
    }

    pub fn stage_completed(
        name: impl Into<String>,
        outcome: StageOutcome,
        duration: Duration,
    ) -> Self {
        Self::StageCompleted {
            stage_name: name.into(),
            outcome,
            duration,
        }
    }

    pub fn stage_skipped(
        name: impl Into<String>,
        blocking_dependency: impl Into<String>,
    ) -> Self {
        Self::StageSkipped {
            stage_name: name.into(),
            blocking_dependency: blocking_dependency.into(),
        }
    }

    pub fn job_started(
        stage_name: impl Into<String>,
        job_name: impl Into<String>,
        display_name: Option<String>,
        total_steps: usize,
    ) -> Self {
        Self::JobStarted {
            stage_name: stage_name.into(),
            job_name: job_name.into(),
            display_name,
            total_steps,
        }
    }

    pub fn job_completed(
        stage_name: impl Into<String>,
        job_name: impl Into<String>,
        outcome: JobOutcome,
        duration: Duration,
    ) -> Self {
        Self::JobCompleted {
            stage_name: stage_name.into(),
            job_name: job_name.into(),
            outcome,
            duration,
        }
    }

    pub fn step_started(
        stage_name: impl Into<String>,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
    ) -> Self {
        Self::StepStarted {
            stage_name: stage_name.into(),
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
        }
    }

    pub fn step_output(
        stage_name: impl Into<String>,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        output: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self::StepOutput {
            stage_name: stage_name.into(),
            job_name: job_name.into(),
            step_name: step_name.into(),
            output: output.into(),
            is_error,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn step_completed(
        stage_name: impl Into<String>,
        job_name: impl Into<String>,
        step_name: impl Into<String>,
        step_index: usize,
        outcome: StepOutcome,
        duration: Duration,
        exit_code: Option<i32>,
    ) -> Self {
        Self::StepCompleted {
            stage_name: stage_name.into(),
            job_name: job_name.into(),
            step_name: step_name.into(),
            step_index,
            outcome,
            duration,
            exit_code,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_progress_channel() {
        let (tx, mut rx) = progress_channel();

        tx.send_event(ExecutionEvent::pipeline_started("verify", 2));
        tx.send_event(ExecutionEvent::stage_started("check", None, 1));

        let event1 = rx.recv().await.unwrap();
        assert!(matches!(event1, ExecutionEvent::PipelineStarted { .. }));

        let event2 = rx.recv().await.unwrap();
        assert!(matches!(event2, ExecutionEvent::StageStarted { .. }));
    }

    #[test]
    fn test_event_construction() {
        let event = ExecutionEvent::job_completed(
            "test",
            "cargo_test",
            JobOutcome::Succeeded,
            Duration::from_secs(30),
        );

        if let ExecutionEvent::JobCompleted {
            stage_name,
            job_name,
            outcome,
            duration,
        } = event
        {
            assert_eq!(stage_name, "test");
            assert_eq!(job_name, "cargo_test");
            assert_eq!(outcome, JobOutcome::Succeeded);
            assert_eq!(duration, Duration::from_secs(30));
        } else {
            panic!("wrong event type");
        }
    }

    #[test]
    fn test_optional_sender() {
        let sender: Option<ProgressSender> = None;
        // Should not panic
        sender.send_event(ExecutionEvent::stage_skipped("test", "check"));
    }
}
