// Execution Module
// Dependency graph, scheduling, progress events, and status aggregation

pub mod context;
pub mod events;
pub mod executor;
pub mod graph;
pub mod status;

pub use context::{ExecutionContext, VariableStore};
pub use events::{progress_channel, EventSender, ExecutionEvent, ProgressReceiver, ProgressSender};
pub use executor::{ExecutionPlan, ExecutorConfig, PipelineExecutor};
pub use graph::{GraphError, GraphErrorKind, StageGraph};
pub use status::{
    JobOutcome, JobRecord, PipelineOutcome, PipelineReport, PipelineStatus,
    QualifiedDependencyPolicy, StageOutcome, StageRecord, StepOutcome, StepRecord,
};
