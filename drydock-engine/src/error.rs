// Crate Error Type
// Unifies the stage-specific errors for callers that load end to end

use crate::execution::graph::GraphError;
use crate::parser::error::{ParseError, ValidationError};
use crate::template::resolver::ResolutionError;

use thiserror::Error;

/// Any error from loading a pipeline: parse, validate, resolve, or graph
/// construction. Each variant preserves the underlying error so callers
/// can still match on the stage that failed.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}

impl From<Vec<ValidationError>> for OrchestratorError {
    fn from(errors: Vec<ValidationError>) -> Self {
        Self::Validation(errors)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    rendered.join("\n")
}
