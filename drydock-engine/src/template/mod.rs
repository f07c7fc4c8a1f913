// Template Resolution Module
// External template fetching and recursive expansion into concrete steps

pub mod resolver;
pub mod source;

pub use resolver::{resolve_pipeline, ResolutionError, TemplateResolver};
pub use source::{FsTemplateSource, RetryingSource, SourceError, TemplateSource};
