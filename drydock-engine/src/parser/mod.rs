// Parser module for pipeline definitions
// Provides YAML parsing, shape validation, and the typed pipeline model

pub mod definition;
pub mod error;
pub mod models;

pub use definition::{DefinitionParser, DefinitionValidator};
pub use error::{ParseError, ParseErrorKind, ParseResult, ValidationError};
pub use models::*;
