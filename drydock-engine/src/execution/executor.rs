// Pipeline Executor
// Drives the wave schedule: concurrent stages and jobs, sequential steps

use crate::execution::context::ExecutionContext;
use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::graph::StageGraph;
use crate::execution::status::{
    JobRecord, PipelineReport, PipelineStatus, QualifiedDependencyPolicy, StageOutcome,
    StageRecord, StepOutcome, StepRecord,
};
use crate::parser::models::{ResolvedJob, ResolvedStage, StepSpec};
use crate::runner::StepRunner;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Configuration for pipeline execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Upper bound on jobs running at once across the whole pipeline.
    /// Zero means unbounded.
    pub max_concurrent_jobs: usize,
    /// Timeout applied to steps that declare none of their own
    pub default_step_timeout: Option<Duration>,
    /// How qualified success feeds into downstream verdicts
    pub qualified_dependency_policy: QualifiedDependencyPolicy,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 0,
            default_step_timeout: None,
            qualified_dependency_policy: QualifiedDependencyPolicy::default(),
        }
    }
}

/// Executes a resolved pipeline wave by wave.
///
/// Stages within a wave and jobs within a stage run as concurrent tokio
/// tasks; steps within a job run strictly in order. Worker tasks only
/// report results back; the executor loop is the single writer of
/// aggregated status.
pub struct PipelineExecutor {
    graph: StageGraph,
    config: ExecutorConfig,
    runner: Arc<dyn StepRunner>,
    event_tx: Option<ProgressSender>,
}

impl PipelineExecutor {
    pub fn new(graph: StageGraph, runner: Arc<dyn StepRunner>) -> Self {
        Self {
            graph,
            config: ExecutorConfig::default(),
            runner,
            event_tx: None,
        }
    }

    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, sender: ProgressSender) -> Self {
        self.event_tx = Some(sender);
        self
    }

    /// Run the pipeline to completion and return the aggregated report.
    ///
    /// An individual failure never aborts the run early; every stage either
    /// executes or is recorded as skipped, so the report is always total.
    pub async fn execute(&self, context: ExecutionContext) -> PipelineReport {
        let started = Instant::now();
        let context = Arc::new(context);
        let mut status = PipelineStatus::new(
            context.pipeline_name.clone(),
            self.config.qualified_dependency_policy,
        );

        self.event_tx.send_event(ExecutionEvent::pipeline_started(
            &context.pipeline_name,
            self.graph.stages.len(),
        ));

        let semaphore = if self.config.max_concurrent_jobs > 0 {
            Some(Arc::new(Semaphore::new(self.config.max_concurrent_jobs)))
        } else {
            None
        };

        for wave in self.graph.waves() {
            let mut handles = Vec::new();

            for stage in wave {
                // A wave stage only depends on earlier waves, so the skip
                // decision is final by the time its wave starts
                if let Some(blocked_by) = status
                    .blocking_dependency(&stage.depends_on)
                    .map(str::to_string)
                {
                    tracing::info!(stage = %stage.name, %blocked_by, "skipping stage");
                    self.event_tx
                        .send_event(ExecutionEvent::stage_skipped(&stage.name, &blocked_by));
                    let jobs = stage
                        .jobs
                        .iter()
                        .map(|j| JobRecord::skipped(j.name.clone(), j.allow_fail))
                        .collect();
                    status.record_stage(StageRecord::skipped(&stage.name, blocked_by, jobs));
                    continue;
                }

                let handle = tokio::spawn(run_stage(
                    stage.clone(),
                    context.clone(),
                    self.runner.clone(),
                    semaphore.clone(),
                    self.event_tx.clone(),
                    self.config.default_step_timeout,
                ));
                handles.push((stage.clone(), handle));
            }

            for (stage, handle) in handles {
                let record = match handle.await {
                    Ok(record) => record,
                    Err(e) => {
                        tracing::error!(stage = %stage.name, error = %e, "stage task panicked");
                        StageRecord {
                            name: stage.name.clone(),
                            outcome: StageOutcome::Failed,
                            jobs: Vec::new(),
                            skip_reason: None,
                        }
                    }
                };
                status.record_stage(record);
                status.apply_dependency_policy(&stage.name, &stage.depends_on);
            }
        }

        let report = status.into_report(started.elapsed());
        self.event_tx.send_event(ExecutionEvent::pipeline_completed(
            &report.pipeline,
            report.is_success(),
            report.duration,
        ));
        report
    }

    /// The dry-run schedule without executing anything
    pub fn plan(&self) -> ExecutionPlan {
        ExecutionPlan::from_graph(&self.graph)
    }
}

#[tracing::instrument(skip_all, fields(stage = %stage.name))]
async fn run_stage(
    stage: ResolvedStage,
    context: Arc<ExecutionContext>,
    runner: Arc<dyn StepRunner>,
    semaphore: Option<Arc<Semaphore>>,
    events: Option<ProgressSender>,
    default_timeout: Option<Duration>,
) -> StageRecord {
    let started = Instant::now();
    events.send_event(ExecutionEvent::stage_started(
        &stage.name,
        stage.display_name.clone(),
        stage.jobs.len(),
    ));

    let mut handles = Vec::new();
    for job in &stage.jobs {
        handles.push((
            job.clone(),
            tokio::spawn(run_job(
                stage.name.clone(),
                job.clone(),
                context.clone(),
                runner.clone(),
                semaphore.clone(),
                events.clone(),
                default_timeout,
            )),
        ));
    }

    let mut job_records = Vec::with_capacity(handles.len());
    for (job, handle) in handles {
        match handle.await {
            Ok(record) => job_records.push(record),
            Err(e) => {
                tracing::error!(job = %job.name, error = %e, "job task panicked");
                job_records.push(JobRecord {
                    name: job.name.clone(),
                    outcome: crate::execution::status::JobOutcome::Failed,
                    allow_fail: job.allow_fail,
                    steps: Vec::new(),
                });
            }
        }
    }

    let record = StageRecord::from_jobs(&stage.name, job_records);
    events.send_event(ExecutionEvent::stage_completed(
        &stage.name,
        record.outcome,
        started.elapsed(),
    ));
    record
}

#[tracing::instrument(skip_all, fields(stage = %stage_name, job = %job.name))]
async fn run_job(
    stage_name: String,
    job: ResolvedJob,
    context: Arc<ExecutionContext>,
    runner: Arc<dyn StepRunner>,
    semaphore: Option<Arc<Semaphore>>,
    events: Option<ProgressSender>,
    default_timeout: Option<Duration>,
) -> JobRecord {
    // The permit bounds concurrency across the whole pipeline; waiters
    // are served in FIFO order
    let _permit = match &semaphore {
        Some(sem) => sem.clone().acquire_owned().await.ok(),
        None => None,
    };

    let started = Instant::now();
    events.send_event(ExecutionEvent::job_started(
        &stage_name,
        &job.name,
        job.display_name.clone(),
        job.steps.len(),
    ));

    let working_dir = context
        .working_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));

    let mut step_records = Vec::new();
    for (index, step) in job.steps.iter().enumerate() {
        events.send_event(ExecutionEvent::step_started(
            &stage_name,
            &job.name,
            &step.name,
            index,
        ));

        let step_started = Instant::now();
        let record = run_step(step, &context, runner.as_ref(), &working_dir, default_timeout).await;

        if !record.output.is_empty() {
            events.send_event(ExecutionEvent::step_output(
                &stage_name,
                &job.name,
                &step.name,
                record.output.clone(),
                false,
            ));
        }
        if let Some(error) = &record.error {
            events.send_event(ExecutionEvent::step_output(
                &stage_name,
                &job.name,
                &step.name,
                error.clone(),
                true,
            ));
        }
        events.send_event(ExecutionEvent::step_completed(
            &stage_name,
            &job.name,
            &step.name,
            index,
            record.outcome,
            step_started.elapsed(),
            record.exit_code,
        ));

        let failed_hard = record.outcome == StepOutcome::Failed;
        step_records.push(record);
        if failed_hard {
            // Remaining steps in the job never run
            break;
        }
    }

    let record = JobRecord::from_steps(&job.name, job.allow_fail, step_records);
    events.send_event(ExecutionEvent::job_completed(
        &stage_name,
        &job.name,
        record.outcome,
        started.elapsed(),
    ));
    record
}

async fn run_step(
    step: &StepSpec,
    context: &ExecutionContext,
    runner: &dyn StepRunner,
    working_dir: &std::path::Path,
    default_timeout: Option<Duration>,
) -> StepRecord {
    let started = Instant::now();

    let effective = StepSpec {
        action: context.interpolate(&step.action),
        ..step.clone()
    };
    let env = context.step_env(&step.env);
    let timeout = step
        .timeout_in_minutes
        .map(|minutes| Duration::from_secs(minutes * 60))
        .or(default_timeout);

    match runner.run(&effective, &env, working_dir, timeout).await {
        Ok(execution) => {
            let outcome = if execution.success {
                StepOutcome::Succeeded
            } else if step.continue_on_error {
                StepOutcome::FailedTolerated
            } else {
                StepOutcome::Failed
            };
            StepRecord {
                name: step.name.clone(),
                outcome,
                output: execution.output,
                error: execution.error,
                exit_code: execution.exit_code,
                duration: started.elapsed(),
            }
        }
        Err(e) => {
            // Dispatch failure counts as step failure under the same
            // continueOnError policy
            let outcome = if step.continue_on_error {
                StepOutcome::FailedTolerated
            } else {
                StepOutcome::Failed
            };
            StepRecord {
                name: step.name.clone(),
                outcome,
                output: String::new(),
                error: Some(e.to_string()),
                exit_code: None,
                duration: started.elapsed(),
            }
        }
    }
}

/// The schedule a pipeline would follow, without executing anything
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    pub waves: Vec<Vec<PlannedStage>>,
}

#[derive(Debug, Clone)]
pub struct PlannedStage {
    pub name: String,
    pub depends_on: Vec<String>,
    pub jobs: Vec<PlannedJob>,
}

#[derive(Debug, Clone)]
pub struct PlannedJob {
    pub name: String,
    pub step_count: usize,
}

impl ExecutionPlan {
    pub fn from_graph(graph: &StageGraph) -> Self {
        let waves = graph
            .waves()
            .into_iter()
            .map(|wave| {
                wave.into_iter()
                    .map(|stage| PlannedStage {
                        name: stage.name.clone(),
                        depends_on: stage.depends_on.clone(),
                        jobs: stage
                            .jobs
                            .iter()
                            .map(|job| PlannedJob {
                                name: job.name.clone(),
                                step_count: job.steps.len(),
                            })
                            .collect(),
                    })
                    .collect()
            })
            .collect();

        Self { waves }
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, wave) in self.waves.iter().enumerate() {
            writeln!(f, "wave {}:", i)?;
            for stage in wave {
                if stage.depends_on.is_empty() {
                    writeln!(f, "  {}", stage.name)?;
                } else {
                    writeln!(f, "  {} (after {})", stage.name, stage.depends_on.join(", "))?;
                }
                for job in &stage.jobs {
                    writeln!(f, "    {} ({} steps)", job.name, job.step_count)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::status::{JobOutcome, PipelineOutcome};
    use crate::parser::models::ResolvedPipeline;
    use crate::runner::{RunnerError, StepExecution};
    use async_trait::async_trait;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Runner scripted by action string: actions in `failing` fail, the
    /// rest succeed. Every invocation is logged.
    struct FakeRunner {
        failing: HashSet<String>,
        log: Mutex<Vec<String>>,
        timeouts: Mutex<Vec<Option<Duration>>>,
        active: AtomicUsize,
        peak_active: AtomicUsize,
    }

    impl FakeRunner {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
                log: Mutex::new(Vec::new()),
                timeouts: Mutex::new(Vec::new()),
                active: AtomicUsize::new(0),
                peak_active: AtomicUsize::new(0),
            }
        }

        fn invocations(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl StepRunner for FakeRunner {
        async fn run(
            &self,
            step: &StepSpec,
            _env: &HashMap<String, String>,
            _working_dir: &std::path::Path,
            timeout: Option<Duration>,
        ) -> Result<StepExecution, RunnerError> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_active.fetch_max(active, Ordering::SeqCst);

            self.log.lock().unwrap().push(step.action.clone());
            self.timeouts.lock().unwrap().push(timeout);
            tokio::time::sleep(Duration::from_millis(10)).await;

            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&step.action) {
                Ok(StepExecution::failed("scripted failure", Some(1)))
            } else {
                Ok(StepExecution::succeeded("ok"))
            }
        }
    }

    fn stage(name: &str, deps: &[&str], jobs: Vec<ResolvedJob>) -> ResolvedStage {
        ResolvedStage {
            name: name.to_string(),
            display_name: None,
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            jobs,
        }
    }

    fn job(name: &str, allow_fail: bool, actions: &[&str]) -> ResolvedJob {
        ResolvedJob {
            name: name.to_string(),
            display_name: None,
            allow_fail,
            steps: actions
                .iter()
                .map(|a| StepSpec {
                    name: a.to_string(),
                    action: a.to_string(),
                    continue_on_error: false,
                    env: HashMap::new(),
                    timeout_in_minutes: None,
                })
                .collect(),
        }
    }

    fn executor(stages: Vec<ResolvedStage>, runner: Arc<FakeRunner>) -> PipelineExecutor {
        let graph = StageGraph::build(&ResolvedPipeline {
            name: "verify".to_string(),
            stages,
        })
        .unwrap();
        PipelineExecutor::new(graph, runner)
    }

    #[tokio::test]
    async fn test_linear_chain_runs_in_order() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![
                stage("check", &[], vec![job("c", false, &["cargo check"])]),
                stage("test", &["check"], vec![job("t", false, &["cargo test"])]),
                stage("report", &["test"], vec![job("r", false, &["summarize"])]),
            ],
            runner.clone(),
        );

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::Succeeded);
        assert_eq!(
            runner.invocations(),
            vec!["cargo check", "cargo test", "summarize"]
        );
    }

    #[tokio::test]
    async fn test_allow_fail_job_qualifies_but_does_not_block() {
        let runner = Arc::new(FakeRunner::new(&["cargo +beta fmt"]));
        let exec = executor(
            vec![
                stage(
                    "style",
                    &[],
                    vec![
                        job("rustfmt", false, &["cargo fmt --check"]),
                        job("beta_fmt", true, &["cargo +beta fmt"]),
                    ],
                ),
                stage("report", &["style"], vec![job("r", false, &["summarize"])]),
            ],
            runner.clone(),
        );

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::SucceededWithQualifications);
        assert!(report.is_success());

        let style = report.stage("style").unwrap();
        assert_eq!(style.outcome, StageOutcome::SucceededWithAllowedFailures);
        assert_eq!(report.stage("report").unwrap().outcome, StageOutcome::Succeeded);
        assert!(runner.invocations().contains(&"summarize".to_string()));
    }

    #[tokio::test]
    async fn test_failed_stage_skips_dependents_transitively() {
        let runner = Arc::new(FakeRunner::new(&["cargo check"]));
        let exec = executor(
            vec![
                stage("check", &[], vec![job("c", false, &["cargo check"])]),
                stage("test", &["check"], vec![job("t", false, &["cargo test"])]),
                stage("coverage", &["test"], vec![job("cov", false, &["grcov"])]),
                stage("style", &[], vec![job("fmt", false, &["cargo fmt --check"])]),
            ],
            runner.clone(),
        );

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::Failed);
        assert_eq!(report.stage("test").unwrap().outcome, StageOutcome::Skipped);
        assert_eq!(
            report.stage("test").unwrap().skip_reason.as_deref(),
            Some("check")
        );
        assert_eq!(report.stage("coverage").unwrap().outcome, StageOutcome::Skipped);

        // Skipped stages still enumerate their jobs in the report
        let skipped_jobs = &report.stage("test").unwrap().jobs;
        assert_eq!(skipped_jobs.len(), 1);
        assert_eq!(skipped_jobs[0].name, "t");
        assert_eq!(skipped_jobs[0].outcome, JobOutcome::Skipped);

        // The independent branch still runs; skipped steps never dispatch
        let invocations = runner.invocations();
        assert!(invocations.contains(&"cargo fmt --check".to_string()));
        assert!(!invocations.contains(&"cargo test".to_string()));
        assert!(!invocations.contains(&"grcov".to_string()));
    }

    #[tokio::test]
    async fn test_independent_stages_run_in_same_wave() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![
                stage("check", &[], vec![job("c", false, &["cargo check"])]),
                stage("test", &["check"], vec![job("t", false, &["cargo test"])]),
                stage("style", &["check"], vec![job("fmt", false, &["cargo fmt --check"])]),
                stage(
                    "report",
                    &["test", "style"],
                    vec![job("r", false, &["summarize"])],
                ),
            ],
            runner.clone(),
        );

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::Succeeded);

        let invocations = runner.invocations();
        assert_eq!(invocations.first().map(String::as_str), Some("cargo check"));
        assert_eq!(invocations.last().map(String::as_str), Some("summarize"));
        assert_eq!(invocations.len(), 4);
        // Wave 1 overlapped: both of its jobs were in flight together
        assert!(runner.peak_active.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_continue_on_error_keeps_job_going() {
        let runner = Arc::new(FakeRunner::new(&["cargo doc"]));
        let mut tolerant = job("docs", false, &["cargo doc", "cargo deadlinks"]);
        tolerant.steps[0].continue_on_error = true;

        let exec = executor(vec![stage("docs", &[], vec![tolerant])], runner.clone());
        let report = exec.execute(ExecutionContext::new("verify")).await;

        assert_eq!(report.outcome, PipelineOutcome::SucceededWithQualifications);
        let docs_job = &report.stage("docs").unwrap().jobs[0];
        assert_eq!(docs_job.outcome, JobOutcome::SucceededWithToleratedFailures);
        assert!(runner.invocations().contains(&"cargo deadlinks".to_string()));
    }

    #[tokio::test]
    async fn test_hard_failure_stops_remaining_steps() {
        let runner = Arc::new(FakeRunner::new(&["cargo build"]));
        let exec = executor(
            vec![stage(
                "build",
                &[],
                vec![job("b", false, &["cargo build", "cargo test"])],
            )],
            runner.clone(),
        );

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::Failed);
        assert!(!runner.invocations().contains(&"cargo test".to_string()));

        let build_job = &report.stage("build").unwrap().jobs[0];
        assert_eq!(build_job.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_max_concurrent_jobs_bounds_parallelism() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![stage(
                "test",
                &[],
                vec![
                    job("a", false, &["test a"]),
                    job("b", false, &["test b"]),
                    job("c", false, &["test c"]),
                    job("d", false, &["test d"]),
                ],
            )],
            runner.clone(),
        )
        .with_config(ExecutorConfig {
            max_concurrent_jobs: 1,
            ..ExecutorConfig::default()
        });

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(report.outcome, PipelineOutcome::Succeeded);
        assert_eq!(runner.invocations().len(), 4);
        assert_eq!(runner.peak_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_step_timeout_reaches_runner() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let mut timed = job("t", false, &["cargo test"]);
        timed.steps[0].timeout_in_minutes = Some(7);

        let exec = executor(vec![stage("test", &[], vec![timed])], runner.clone())
            .with_config(ExecutorConfig {
                default_step_timeout: Some(Duration::from_secs(60)),
                ..ExecutorConfig::default()
            });

        exec.execute(ExecutionContext::new("verify")).await;
        let timeouts = runner.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts, vec![Some(Duration::from_secs(7 * 60))]);
    }

    #[tokio::test]
    async fn test_default_timeout_applies_when_step_has_none() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![stage("test", &[], vec![job("t", false, &["cargo test"])])],
            runner.clone(),
        )
        .with_config(ExecutorConfig {
            default_step_timeout: Some(Duration::from_secs(60)),
            ..ExecutorConfig::default()
        });

        exec.execute(ExecutionContext::new("verify")).await;
        let timeouts = runner.timeouts.lock().unwrap().clone();
        assert_eq!(timeouts, vec![Some(Duration::from_secs(60))]);
    }

    #[tokio::test]
    async fn test_propagate_policy_taints_report() {
        let runner = Arc::new(FakeRunner::new(&["cargo +beta fmt"]));
        let exec = executor(
            vec![
                stage("style", &[], vec![job("beta", true, &["cargo +beta fmt"])]),
                stage("report", &["style"], vec![job("r", false, &["summarize"])]),
            ],
            runner.clone(),
        )
        .with_config(ExecutorConfig {
            qualified_dependency_policy: QualifiedDependencyPolicy::Propagate,
            ..ExecutorConfig::default()
        });

        let report = exec.execute(ExecutionContext::new("verify")).await;
        assert_eq!(
            report.stage("report").unwrap().outcome,
            StageOutcome::SucceededWithAllowedFailures
        );
    }

    #[tokio::test]
    async fn test_runtime_variables_interpolate_into_actions() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![stage(
                "test",
                &[],
                vec![job("t", false, &["cargo +$(TOOLCHAIN) test"])],
            )],
            runner.clone(),
        );

        let context = ExecutionContext::new("verify").with_variable("TOOLCHAIN", "nightly");
        exec.execute(context).await;
        assert_eq!(runner.invocations(), vec!["cargo +nightly test"]);
    }

    #[tokio::test]
    async fn test_skip_events_are_emitted() {
        let runner = Arc::new(FakeRunner::new(&["cargo check"]));
        let (tx, mut rx) = crate::execution::events::progress_channel();
        let exec = executor(
            vec![
                stage("check", &[], vec![job("c", false, &["cargo check"])]),
                stage("test", &["check"], vec![job("t", false, &["cargo test"])]),
            ],
            runner,
        )
        .with_events(tx);

        exec.execute(ExecutionContext::new("verify")).await;

        let mut saw_skip = false;
        while let Ok(event) = rx.try_recv() {
            if let ExecutionEvent::StageSkipped {
                stage_name,
                blocking_dependency,
            } = event
            {
                assert_eq!(stage_name, "test");
                assert_eq!(blocking_dependency, "check");
                saw_skip = true;
            }
        }
        assert!(saw_skip);
    }

    #[tokio::test]
    async fn test_plan_reflects_wave_schedule() {
        let runner = Arc::new(FakeRunner::new(&[]));
        let exec = executor(
            vec![
                stage("check", &[], vec![job("c", false, &["cargo check"])]),
                stage("test", &["check"], vec![job("t", false, &["cargo test"])]),
                stage("style", &["check"], vec![job("fmt", false, &["cargo fmt"])]),
            ],
            runner,
        );

        let plan = exec.plan();
        assert_eq!(plan.waves.len(), 2);
        assert_eq!(plan.waves[0][0].name, "check");
        assert_eq!(plan.waves[1].len(), 2);

        let rendered = plan.to_string();
        assert!(rendered.contains("wave 0:"));
        assert!(rendered.contains("test (after check)"));
    }
}
