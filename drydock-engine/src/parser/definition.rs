// Definition Parser
// Turns raw declarative YAML into a validated in-memory pipeline model

use crate::parser::error::{ParseError, ParseResult, ValidationError};
use crate::parser::models::{JobSpec, PipelineDefinition, Stage};

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Parser for pipeline definition documents
pub struct DefinitionParser;

impl DefinitionParser {
    /// Parse a pipeline definition from a YAML string
    pub fn parse(content: &str) -> ParseResult<PipelineDefinition> {
        let definition: PipelineDefinition = serde_yaml::from_str(content)
            .map_err(|e| ParseError::from_yaml_error(&e, content))?;

        Ok(definition)
    }

    /// Parse a pipeline definition from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<PipelineDefinition> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::io(format!("failed to read '{}': {}", path.display(), e))
        })?;

        Self::parse(&content)
    }
}

/// Semantic validator for parsed definitions.
///
/// Fails fast: any violation aborts before resolution or execution, so a
/// malformed definition can never produce a partial run.
pub struct DefinitionValidator;

impl DefinitionValidator {
    /// Validate a parsed definition for semantic correctness
    pub fn validate(definition: &PipelineDefinition) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if definition.stages.is_empty() {
            errors.push(ValidationError::new(
                "pipeline must declare at least one stage",
                "stages",
            ));
        }

        Self::check_stage_names(&definition.stages, &mut errors);
        Self::check_dependencies(&definition.stages, &mut errors);
        Self::check_repositories(definition, &mut errors);

        for stage in &definition.stages {
            Self::check_stage_jobs(stage, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Stage names must be unique across the pipeline
    fn check_stage_names(stages: &[Stage], errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for stage in stages {
            if stage.stage.is_empty() {
                errors.push(ValidationError::new("stage name must not be empty", "stages"));
            } else if !seen.insert(stage.stage.as_str()) {
                errors.push(ValidationError::new(
                    format!("duplicate stage name '{}'", stage.stage),
                    format!("stages.{}", stage.stage),
                ));
            }
        }
    }

    /// Every dependsOn entry must name a declared stage. Forward references
    /// are allowed since execution order is graph-derived, not declaration
    /// order; cycles are caught later by the graph builder.
    fn check_dependencies(stages: &[Stage], errors: &mut Vec<ValidationError>) {
        let stage_names: Vec<&str> = stages.iter().map(|s| s.stage.as_str()).collect();

        for stage in stages {
            for dep in stage.depends_on.as_vec() {
                if dep == stage.stage {
                    errors.push(ValidationError::new(
                        format!("stage '{}' depends on itself", stage.stage),
                        format!("stages.{}.dependsOn", stage.stage),
                    ));
                } else if !stage_names.contains(&dep.as_str()) {
                    errors.push(
                        ValidationError::new(
                            format!("stage '{}' depends on unknown stage '{}'", stage.stage, dep),
                            format!("stages.{}.dependsOn", stage.stage),
                        )
                        .with_suggestion(format!("available stages: {}", stage_names.join(", "))),
                    );
                }
            }
        }
    }

    /// Repository aliases must be unique, and every template reference must
    /// point at a declared alias
    fn check_repositories(definition: &PipelineDefinition, errors: &mut Vec<ValidationError>) {
        let mut seen = HashSet::new();
        for repo in &definition.resources.repositories {
            if !seen.insert(repo.alias.as_str()) {
                errors.push(ValidationError::new(
                    format!("duplicate repository alias '{}'", repo.alias),
                    "resources.repositories",
                ));
            }
        }

        for stage in &definition.stages {
            for job in &stage.jobs {
                let Some(reference) = &job.template else {
                    continue;
                };
                let path = format!("stages.{}.jobs.{}.template", stage.stage, job.job);
                match reference.rsplit_once('@') {
                    Some((_, alias)) if seen.contains(alias) => {}
                    Some((_, alias)) => {
                        errors.push(
                            ValidationError::new(
                                format!("template references undeclared repository '{}'", alias),
                                path,
                            )
                            .with_suggestion(
                                "declare the repository under resources.repositories",
                            ),
                        );
                    }
                    None => {
                        errors.push(
                            ValidationError::new(
                                format!(
                                    "template reference '{}' is missing a repository alias",
                                    reference
                                ),
                                path,
                            )
                            .with_suggestion("use the form 'path/to/template.yml@alias'"),
                        );
                    }
                }
            }
        }
    }

    /// Jobs must be well-formed: unique names within the stage, and exactly
    /// one of inline steps or a template reference
    fn check_stage_jobs(stage: &Stage, errors: &mut Vec<ValidationError>) {
        if stage.jobs.is_empty() {
            errors.push(ValidationError::new(
                "stage must have at least one job",
                format!("stages.{}.jobs", stage.stage),
            ));
        }

        let mut seen = HashSet::new();
        for job in &stage.jobs {
            let path = format!("stages.{}.jobs.{}", stage.stage, job.job);

            if !seen.insert(job.job.as_str()) {
                errors.push(ValidationError::new(
                    format!("duplicate job name '{}' in stage '{}'", job.job, stage.stage),
                    path.clone(),
                ));
            }

            Self::check_job_shape(job, &path, errors);
        }
    }

    fn check_job_shape(job: &JobSpec, path: &str, errors: &mut Vec<ValidationError>) {
        match (&job.template, job.steps.is_empty()) {
            (Some(_), false) => {
                errors.push(
                    ValidationError::new(
                        "job declares both inline steps and a template reference",
                        path,
                    )
                    .with_suggestion("use either 'steps:' or 'template:', not both"),
                );
            }
            (None, true) => {
                errors.push(
                    ValidationError::new(
                        "job declares neither inline steps nor a template reference",
                        path,
                    )
                    .with_suggestion("add 'steps:' or 'template:' to the job"),
                );
            }
            _ => {}
        }

        if job.template.is_none() && !job.parameters.is_empty() {
            errors.push(ValidationError::new(
                "parameters are only meaningful on template references",
                format!("{}.parameters", path),
            ));
        }

        for step in &job.steps {
            if step.name.is_empty() {
                errors.push(ValidationError::new(
                    "step name must not be empty",
                    format!("{}.steps", path),
                ));
            }
        }
    }
}
