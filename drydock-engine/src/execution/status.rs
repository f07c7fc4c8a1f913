// Status Aggregation
// Rolls step results up through jobs and stages into a pipeline verdict

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StepOutcome {
    Succeeded,
    Failed,
    /// Failed, but the step carried continueOnError
    FailedTolerated,
}

/// Outcome of a job, derived from its step records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobOutcome {
    Succeeded,
    /// All steps ran, some failed under continueOnError
    SucceededWithToleratedFailures,
    Failed,
    Skipped,
}

/// Outcome of a stage, derived from its job records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Succeeded,
    /// Some jobs failed, but every failed job carried allowFail
    SucceededWithAllowedFailures,
    Failed,
    /// Never ran because a dependency was unacceptable
    Skipped,
}

/// Overall pipeline verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineOutcome {
    Succeeded,
    /// Succeeded, but some failures were absorbed by policy along the way
    SucceededWithQualifications,
    Failed,
}

/// How qualified success feeds into downstream stages.
///
/// A stage that succeeded with allowed failures always unblocks its
/// dependents; the policy only decides whether the qualification taints
/// their verdicts too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualifiedDependencyPolicy {
    /// Downstream stages report their own results untainted
    #[default]
    Absorb,
    /// Downstream clean successes are downgraded to qualified
    Propagate,
}

/// Record of one executed step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub outcome: StepOutcome,
    pub output: String,
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    pub duration: Duration,
}

/// Record of one job and its steps
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub name: String,
    pub outcome: JobOutcome,
    pub allow_fail: bool,
    pub steps: Vec<StepRecord>,
}

impl JobRecord {
    /// Derive the job outcome from its step records: the first hard
    /// failure decides, tolerated failures only qualify
    pub fn from_steps(name: impl Into<String>, allow_fail: bool, steps: Vec<StepRecord>) -> Self {
        let outcome = if steps.iter().any(|s| s.outcome == StepOutcome::Failed) {
            JobOutcome::Failed
        } else if steps
            .iter()
            .any(|s| s.outcome == StepOutcome::FailedTolerated)
        {
            JobOutcome::SucceededWithToleratedFailures
        } else {
            JobOutcome::Succeeded
        };

        Self {
            name: name.into(),
            outcome,
            allow_fail,
            steps,
        }
    }

    pub fn skipped(name: impl Into<String>, allow_fail: bool) -> Self {
        Self {
            name: name.into(),
            outcome: JobOutcome::Skipped,
            allow_fail,
            steps: Vec::new(),
        }
    }
}

/// Record of one stage and its jobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub name: String,
    pub outcome: StageOutcome,
    pub jobs: Vec<JobRecord>,
    /// For skipped stages, the dependency that blocked them
    pub skip_reason: Option<String>,
}

impl StageRecord {
    /// Derive the stage outcome from its job records. A failed job with
    /// allowFail qualifies the stage instead of failing it.
    pub fn from_jobs(name: impl Into<String>, jobs: Vec<JobRecord>) -> Self {
        let hard_failure = jobs
            .iter()
            .any(|j| j.outcome == JobOutcome::Failed && !j.allow_fail);
        let allowed_failure = jobs
            .iter()
            .any(|j| j.outcome == JobOutcome::Failed && j.allow_fail);
        let tolerated = jobs
            .iter()
            .any(|j| j.outcome == JobOutcome::SucceededWithToleratedFailures);

        let outcome = if hard_failure {
            StageOutcome::Failed
        } else if allowed_failure || tolerated {
            StageOutcome::SucceededWithAllowedFailures
        } else {
            StageOutcome::Succeeded
        };

        Self {
            name: name.into(),
            outcome,
            jobs,
            skip_reason: None,
        }
    }

    /// A stage that never ran. Its jobs are recorded as skipped so the
    /// report stays total down to the job level.
    pub fn skipped(
        name: impl Into<String>,
        blocking_dependency: impl Into<String>,
        jobs: Vec<JobRecord>,
    ) -> Self {
        Self {
            name: name.into(),
            outcome: StageOutcome::Skipped,
            jobs,
            skip_reason: Some(blocking_dependency.into()),
        }
    }

    /// Whether a dependent stage may run after this one
    pub fn is_acceptable_dependency(&self) -> bool {
        matches!(
            self.outcome,
            StageOutcome::Succeeded | StageOutcome::SucceededWithAllowedFailures
        )
    }
}

/// The final report of a pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub outcome: PipelineOutcome,
    pub stages: Vec<StageRecord>,
    pub duration: Duration,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        !matches!(self.outcome, PipelineOutcome::Failed)
    }

    /// Process exit code mirroring the verdict
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }

    pub fn stage(&self, name: &str) -> Option<&StageRecord> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Accumulates stage records during a run. The executor is the single
/// writer; worker tasks report results back through channels, never here.
#[derive(Debug)]
pub struct PipelineStatus {
    pipeline: String,
    records: Vec<StageRecord>,
    by_name: HashMap<String, usize>,
    policy: QualifiedDependencyPolicy,
}

impl PipelineStatus {
    pub fn new(pipeline: impl Into<String>, policy: QualifiedDependencyPolicy) -> Self {
        Self {
            pipeline: pipeline.into(),
            records: Vec::new(),
            by_name: HashMap::new(),
            policy,
        }
    }

    pub fn record_stage(&mut self, record: StageRecord) {
        self.by_name.insert(record.name.clone(), self.records.len());
        self.records.push(record);
    }

    pub fn outcome_of(&self, stage: &str) -> Option<StageOutcome> {
        self.by_name.get(stage).map(|&i| self.records[i].outcome)
    }

    /// The first dependency that blocks `depends_on`, if any. A skipped or
    /// failed dependency blocks; qualified success never does.
    pub fn blocking_dependency<'a>(&self, depends_on: &'a [String]) -> Option<&'a str> {
        depends_on.iter().map(String::as_str).find(|dep| {
            self.by_name
                .get(*dep)
                .map(|&i| !self.records[i].is_acceptable_dependency())
                .unwrap_or(true)
        })
    }

    /// Under the propagating policy, a stage whose dependencies were
    /// qualified cannot report better than qualified itself
    pub fn apply_dependency_policy(&mut self, stage: &str, depends_on: &[String]) {
        if self.policy != QualifiedDependencyPolicy::Propagate {
            return;
        }

        let tainted = depends_on.iter().any(|dep| {
            self.by_name
                .get(dep)
                .map(|&i| self.records[i].outcome == StageOutcome::SucceededWithAllowedFailures)
                .unwrap_or(false)
        });

        if tainted {
            if let Some(&i) = self.by_name.get(stage) {
                if self.records[i].outcome == StageOutcome::Succeeded {
                    self.records[i].outcome = StageOutcome::SucceededWithAllowedFailures;
                }
            }
        }
    }

    /// Finalize into a report. The pipeline fails if any stage failed or
    /// was skipped; it is qualified if any stage absorbed failures.
    pub fn into_report(self, duration: Duration) -> PipelineReport {
        let failed = self
            .records
            .iter()
            .any(|s| matches!(s.outcome, StageOutcome::Failed | StageOutcome::Skipped));
        let qualified = self
            .records
            .iter()
            .any(|s| s.outcome == StageOutcome::SucceededWithAllowedFailures);

        let outcome = if failed {
            PipelineOutcome::Failed
        } else if qualified {
            PipelineOutcome::SucceededWithQualifications
        } else {
            PipelineOutcome::Succeeded
        };

        PipelineReport {
            pipeline: self.pipeline,
            outcome,
            stages: self.records,
            duration,
        }
    }
}
