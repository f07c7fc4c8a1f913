// Drydock Engine
// Core library for build-verification pipeline parsing and execution

pub mod error;
pub mod execution;
pub mod parser;
pub mod runner;
pub mod template;

// Re-export commonly used types
pub use error::OrchestratorError;

// Re-export parser types
pub use parser::{
    DefinitionParser, DefinitionValidator, ParseError, ParseErrorKind, ParseResult,
    PipelineDefinition, ResolvedPipeline, ValidationError,
};

// Re-export template types
pub use template::{
    resolve_pipeline, FsTemplateSource, ResolutionError, RetryingSource, SourceError,
    TemplateResolver, TemplateSource,
};

// Re-export execution types
pub use execution::{
    progress_channel, ExecutionContext, ExecutionEvent, ExecutionPlan, ExecutorConfig, GraphError,
    PipelineExecutor, PipelineOutcome, PipelineReport, ProgressSender, QualifiedDependencyPolicy,
    StageGraph, StageOutcome,
};

// Re-export runner types
pub use runner::{RetryingRunner, RunnerError, ShellRunner, StepExecution, StepRunner};

use std::path::Path;

/// Parse, validate, and resolve a pipeline definition, returning the
/// executable model and its stage graph
pub async fn load_from_str(
    content: &str,
    source: &dyn TemplateSource,
) -> Result<(ResolvedPipeline, StageGraph), OrchestratorError> {
    let definition = DefinitionParser::parse(content)?;
    DefinitionValidator::validate(&definition)?;
    let resolved = resolve_pipeline(&definition, source).await?;
    let graph = StageGraph::build(&resolved)?;
    Ok((resolved, graph))
}

/// Load a pipeline definition from a file
pub async fn load_from_file(
    path: impl AsRef<Path>,
    source: &dyn TemplateSource,
) -> Result<(ResolvedPipeline, StageGraph), OrchestratorError> {
    let definition = DefinitionParser::parse_file(path)?;
    DefinitionValidator::validate(&definition)?;
    let resolved = resolve_pipeline(&definition, source).await?;
    let graph = StageGraph::build(&resolved)?;
    Ok((resolved, graph))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_from_str_end_to_end() {
        let yaml = r#"
name: verify
stages:
  - stage: check
    jobs:
      - job: cargo_check
        steps:
          - name: check
            action: cargo check --all-features
  - stage: test
    dependsOn: check
    jobs:
      - job: cargo_test
        steps:
          - name: test
            action: cargo test
"#;
        let source = FsTemplateSource::new();
        let (resolved, graph) = load_from_str(yaml, &source).await.unwrap();

        assert_eq!(resolved.name, "verify");
        assert_eq!(graph.waves().len(), 2);
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_definition() {
        let yaml = r#"
stages:
  - stage: check
    dependsOn: nowhere
    jobs:
      - job: c
        steps: [{ name: s, action: "true" }]
"#;
        let source = FsTemplateSource::new();
        let err = load_from_str(yaml, &source).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Validation(_)));
    }
}
