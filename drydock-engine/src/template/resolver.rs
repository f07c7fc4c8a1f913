// Template Resolver
// Recursively expands external job/step template references with bound
// parameters into concrete, immutable step lists

use crate::parser::models::{
    JobKind, JobSpec, Parameter, PipelineDefinition, ResolvedJob, ResolvedPipeline, ResolvedStage,
    StepSpec,
};
use crate::template::source::{SourceError, TemplateSource};

use serde::Deserialize;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Maximum template nesting depth, a backstop behind cycle detection
const MAX_TEMPLATE_DEPTH: usize = 32;

/// Errors raised during template resolution. All of them are detected
/// before any step executes.
#[derive(Debug, Error)]
pub enum ResolutionError {
    #[error("'{context}': template reference '{reference}' must take the form 'path@alias'")]
    MalformedReference { context: String, reference: String },

    #[error("'{context}': unknown template repository '{alias}'")]
    UnknownRepository { context: String, alias: String },

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("template '{template}': required parameter '{name}' was not provided")]
    MissingParameter { template: String, name: String },

    #[error("template '{template}': parameter '{name}' expects a {expected} value")]
    ParameterTypeMismatch {
        template: String,
        name: String,
        expected: &'static str,
    },

    #[error("template '{template}': parameter '{name}' value is not in the allowed set")]
    DisallowedParameterValue { template: String, name: String },

    #[error("template '{template}': unresolved placeholder '${{{{ {placeholder} }}}}'")]
    UnresolvedPlaceholder {
        template: String,
        placeholder: String,
    },

    #[error("circular template reference:\n  {}", .chain.join("\n  -> "))]
    CircularReference { chain: Vec<String> },

    #[error("maximum template nesting depth ({limit}) exceeded at '{template}'")]
    MaxDepthExceeded { template: String, limit: usize },

    #[error("template '{template}' is malformed: {reason}")]
    MalformedTemplate { template: String, reason: String },
}

type ResolutionResult<T> = Result<T, ResolutionError>;
type BoxedResolve<'s, T> = Pin<Box<dyn Future<Output = ResolutionResult<T>> + Send + 's>>;

/// A frame on the active resolution stack, keyed by repository alias,
/// template path, and a fingerprint of the bound parameters. A repeat of
/// the same key within the stack is a cycle, not a deeper expansion.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Frame {
    alias: String,
    path: String,
    fingerprint: String,
}

impl Frame {
    fn label(&self) -> String {
        format!("{}@{}", self.path, self.alias)
    }
}

/// The body of a template document: a generator of jobs or of steps
#[derive(Debug)]
enum TemplateContent {
    Jobs(Value),
    Steps(Value),
}

/// A fetched template document before parameter substitution
#[derive(Debug)]
struct TemplateDocument {
    parameters: Vec<Parameter>,
    content: TemplateContent,
}

/// A step-level template reference inside a steps list
#[derive(Debug, Deserialize)]
struct StepTemplateRef {
    template: String,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

/// A job inside a jobs-template body. Steps stay raw here because they may
/// contain step-level template references of their own.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TemplateJob {
    job: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    allow_fail: bool,
    #[serde(default)]
    steps: Option<Value>,
    #[serde(default)]
    template: Option<String>,
    #[serde(default)]
    parameters: HashMap<String, Value>,
}

/// Resolves every template reference in a pipeline definition.
///
/// Resolution is pure and deterministic: identical (template, parameters)
/// pairs always expand to identical step lists. Fetching is delegated to a
/// [`TemplateSource`]; everything else happens on the in-memory YAML tree.
pub struct TemplateResolver<'a> {
    definition: &'a PipelineDefinition,
    source: &'a dyn TemplateSource,
    stack: Vec<Frame>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(definition: &'a PipelineDefinition, source: &'a dyn TemplateSource) -> Self {
        Self {
            definition,
            source,
            stack: Vec::new(),
        }
    }

    /// Resolve the whole definition into an executable model with no
    /// remaining template references
    pub async fn resolve(&mut self) -> ResolutionResult<ResolvedPipeline> {
        let mut stages = Vec::with_capacity(self.definition.stages.len());

        for stage in &self.definition.stages {
            let mut jobs = Vec::new();
            for job in &stage.jobs {
                jobs.extend(self.resolve_job(job).await?);
            }
            stages.push(ResolvedStage {
                name: stage.stage.clone(),
                display_name: stage.display_name.clone(),
                depends_on: stage.depends_on.as_vec(),
                jobs,
            });
        }

        Ok(ResolvedPipeline {
            name: self.definition.display_name().to_string(),
            stages,
        })
    }

    /// Resolve a single job spec: inline jobs pass through, template
    /// references expand (possibly into several jobs)
    async fn resolve_job(&mut self, job: &JobSpec) -> ResolutionResult<Vec<ResolvedJob>> {
        match job.kind() {
            Some(JobKind::Inline(steps)) => Ok(vec![ResolvedJob {
                name: job.job.clone(),
                display_name: job.display_name.clone(),
                allow_fail: job.allow_fail,
                steps: steps.to_vec(),
            }]),
            Some(JobKind::Template {
                reference,
                parameters,
            }) => {
                self.expand_job_template(
                    job.job.clone(),
                    job.display_name.clone(),
                    job.allow_fail,
                    reference.to_string(),
                    parameters.clone(),
                )
                .await
            }
            // The definition validator rejects malformed jobs up front
            None => Err(ResolutionError::MalformedTemplate {
                template: job.job.clone(),
                reason: "job is neither inline nor a template reference".to_string(),
            }),
        }
    }

    /// Expand a job-level template reference.
    ///
    /// A jobs template yields its declared jobs (the caller's allowFail may
    /// loosen, never tighten, each produced job's policy); a steps template
    /// yields a single job named after the referencing spec.
    fn expand_job_template(
        &mut self,
        caller_name: String,
        caller_display: Option<String>,
        caller_allow_fail: bool,
        reference: String,
        provided: HashMap<String, Value>,
    ) -> BoxedResolve<'_, Vec<ResolvedJob>> {
        Box::pin(async move {
            let (document, template_label) = self
                .enter_template(&caller_name, &reference, &provided)
                .await?;

            let result = async {
                let env = bind_parameters(&document.parameters, &provided, &template_label)?;

                match document.content {
                    TemplateContent::Jobs(raw) => {
                        let substituted = substitute_value(&raw, &env, &template_label)?;
                        let template_jobs: Vec<TemplateJob> = serde_yaml::from_value(substituted)
                            .map_err(|e| ResolutionError::MalformedTemplate {
                                template: template_label.clone(),
                                reason: format!("invalid jobs body: {}", e),
                            })?;

                        let mut resolved = Vec::new();
                        for template_job in template_jobs {
                            let produced = self
                                .resolve_template_job(template_job, &template_label)
                                .await?;
                            for mut job in produced {
                                // The caller's policy may loosen, never tighten
                                job.allow_fail = job.allow_fail || caller_allow_fail;
                                resolved.push(job);
                            }
                        }
                        Ok(resolved)
                    }
                    TemplateContent::Steps(raw) => {
                        let substituted = substitute_value(&raw, &env, &template_label)?;
                        let steps = self.steps_from_value(substituted, &template_label).await?;
                        Ok(vec![ResolvedJob {
                            name: caller_name,
                            display_name: caller_display,
                            allow_fail: caller_allow_fail,
                            steps,
                        }])
                    }
                }
            }
            .await;

            self.stack.pop();
            result
        })
    }

    /// Resolve one job declared inside a jobs-template body
    async fn resolve_template_job(
        &mut self,
        job: TemplateJob,
        template_label: &str,
    ) -> ResolutionResult<Vec<ResolvedJob>> {
        match (job.template, job.steps) {
            (Some(reference), None) => {
                self.expand_job_template(
                    job.job,
                    job.display_name,
                    job.allow_fail,
                    reference,
                    job.parameters,
                )
                .await
            }
            (None, Some(steps)) => {
                let steps = self.steps_from_value(steps, template_label).await?;
                Ok(vec![ResolvedJob {
                    name: job.job,
                    display_name: job.display_name,
                    allow_fail: job.allow_fail,
                    steps,
                }])
            }
            _ => Err(ResolutionError::MalformedTemplate {
                template: template_label.to_string(),
                reason: format!(
                    "job '{}' must declare exactly one of 'steps' or 'template'",
                    job.job
                ),
            }),
        }
    }

    /// Expand a step-level template reference into a flat step list.
    /// Only steps templates are valid here.
    fn expand_step_template(
        &mut self,
        context: String,
        reference: String,
        provided: HashMap<String, Value>,
    ) -> BoxedResolve<'_, Vec<StepSpec>> {
        Box::pin(async move {
            let (document, template_label) =
                self.enter_template(&context, &reference, &provided).await?;

            let result = async {
                let env = bind_parameters(&document.parameters, &provided, &template_label)?;

                match document.content {
                    TemplateContent::Steps(raw) => {
                        let substituted = substitute_value(&raw, &env, &template_label)?;
                        self.steps_from_value(substituted, &template_label).await
                    }
                    TemplateContent::Jobs(_) => Err(ResolutionError::MalformedTemplate {
                        template: template_label.clone(),
                        reason: "expected a steps template, found a jobs template".to_string(),
                    }),
                }
            }
            .await;

            self.stack.pop();
            result
        })
    }

    /// Convert a substituted steps value into typed steps, expanding any
    /// nested step-template references in place
    fn steps_from_value<'s>(
        &'s mut self,
        value: Value,
        template_label: &'s str,
    ) -> BoxedResolve<'s, Vec<StepSpec>> {
        Box::pin(async move {
            let Value::Sequence(items) = value else {
                return Err(ResolutionError::MalformedTemplate {
                    template: template_label.to_string(),
                    reason: "'steps' must be a sequence".to_string(),
                });
            };

            let mut steps = Vec::new();
            for item in items {
                let is_template_ref = item
                    .as_mapping()
                    .map(|m| m.contains_key("template"))
                    .unwrap_or(false);

                if is_template_ref {
                    let step_ref: StepTemplateRef =
                        serde_yaml::from_value(item).map_err(|e| {
                            ResolutionError::MalformedTemplate {
                                template: template_label.to_string(),
                                reason: format!("invalid step template reference: {}", e),
                            }
                        })?;
                    let nested = self
                        .expand_step_template(
                            template_label.to_string(),
                            step_ref.template,
                            step_ref.parameters,
                        )
                        .await?;
                    steps.extend(nested);
                } else {
                    let step: StepSpec = serde_yaml::from_value(item).map_err(|e| {
                        ResolutionError::MalformedTemplate {
                            template: template_label.to_string(),
                            reason: format!("invalid step: {}", e),
                        }
                    })?;
                    steps.push(step);
                }
            }

            Ok(steps)
        })
    }

    /// Look up the reference, push a resolution frame (cycle + depth
    /// check), and fetch + parse the document. On success the caller owns
    /// popping the frame.
    async fn enter_template(
        &mut self,
        context: &str,
        reference: &str,
        provided: &HashMap<String, Value>,
    ) -> ResolutionResult<(TemplateDocument, String)> {
        let (path, alias) =
            reference
                .rsplit_once('@')
                .ok_or_else(|| ResolutionError::MalformedReference {
                    context: context.to_string(),
                    reference: reference.to_string(),
                })?;

        let repository = self.definition.repository(alias).ok_or_else(|| {
            ResolutionError::UnknownRepository {
                context: context.to_string(),
                alias: alias.to_string(),
            }
        })?;

        let frame = Frame {
            alias: alias.to_string(),
            path: path.to_string(),
            fingerprint: parameter_fingerprint(provided),
        };
        let label = frame.label();

        if self.stack.contains(&frame) {
            let mut chain: Vec<String> = self.stack.iter().map(Frame::label).collect();
            chain.push(label);
            return Err(ResolutionError::CircularReference { chain });
        }
        if self.stack.len() >= MAX_TEMPLATE_DEPTH {
            return Err(ResolutionError::MaxDepthExceeded {
                template: label,
                limit: MAX_TEMPLATE_DEPTH,
            });
        }

        tracing::debug!(template = %label, depth = self.stack.len(), "fetching template");
        let body = self.source.fetch(repository, path).await?;
        let document = parse_template_document(&body, &label)?;

        self.stack.push(frame);
        Ok((document, label))
    }
}

/// Convenience wrapper: resolve a full definition against a source
pub async fn resolve_pipeline(
    definition: &PipelineDefinition,
    source: &dyn TemplateSource,
) -> ResolutionResult<ResolvedPipeline> {
    TemplateResolver::new(definition, source).resolve().await
}

// =============================================================================
// Document parsing and parameter binding
// =============================================================================

fn parse_template_document(body: &str, label: &str) -> ResolutionResult<TemplateDocument> {
    let value: Value =
        serde_yaml::from_str(body).map_err(|e| ResolutionError::MalformedTemplate {
            template: label.to_string(),
            reason: format!("invalid YAML: {}", e),
        })?;

    let mapping = value
        .as_mapping()
        .ok_or_else(|| ResolutionError::MalformedTemplate {
            template: label.to_string(),
            reason: "template must be a YAML mapping".to_string(),
        })?;

    let parameters = match mapping.get("parameters") {
        Some(params) => serde_yaml::from_value(params.clone()).map_err(|e| {
            ResolutionError::MalformedTemplate {
                template: label.to_string(),
                reason: format!("invalid parameters declaration: {}", e),
            }
        })?,
        None => Vec::new(),
    };

    let content = if let Some(jobs) = mapping.get("jobs") {
        TemplateContent::Jobs(jobs.clone())
    } else if let Some(steps) = mapping.get("steps") {
        TemplateContent::Steps(steps.clone())
    } else {
        return Err(ResolutionError::MalformedTemplate {
            template: label.to_string(),
            reason: "template must contain 'jobs' or 'steps'".to_string(),
        });
    };

    Ok(TemplateDocument {
        parameters,
        content,
    })
}

/// Bind provided parameters against the template's declarations.
///
/// Declared parameters are type-checked and defaulted; a declared parameter
/// with no default and no provided value is an error before any execution.
/// Values reach nested templates only where explicitly re-passed; every
/// expansion builds its binding environment from its own call site alone.
fn bind_parameters(
    declared: &[Parameter],
    provided: &HashMap<String, Value>,
    template: &str,
) -> ResolutionResult<HashMap<String, Value>> {
    let mut env = HashMap::new();

    for param in declared {
        if let Some(value) = provided.get(&param.name) {
            if !param.param_type.matches(value) {
                return Err(ResolutionError::ParameterTypeMismatch {
                    template: template.to_string(),
                    name: param.name.clone(),
                    expected: param.param_type.name(),
                });
            }
            if let Some(allowed) = &param.values {
                if !allowed.iter().any(|v| v == value) {
                    return Err(ResolutionError::DisallowedParameterValue {
                        template: template.to_string(),
                        name: param.name.clone(),
                    });
                }
            }
            env.insert(param.name.clone(), value.clone());
        } else if let Some(default) = &param.default {
            env.insert(param.name.clone(), default.clone());
        } else {
            return Err(ResolutionError::MissingParameter {
                template: template.to_string(),
                name: param.name.clone(),
            });
        }
    }

    // Undeclared extras pass through; they only matter if a placeholder
    // names them
    for (name, value) in provided {
        env.entry(name.clone()).or_insert_with(|| value.clone());
    }

    Ok(env)
}

/// Stable fingerprint of a parameter set, used to key cycle detection:
/// re-entering the same template with different parameters is legitimate
/// recursion (bounded by depth), with identical parameters it is a cycle.
fn parameter_fingerprint(params: &HashMap<String, Value>) -> String {
    let ordered: BTreeMap<&String, &Value> = params.iter().collect();
    serde_json::to_string(&ordered).unwrap_or_else(|_| format!("{:?}", ordered))
}

// =============================================================================
// Placeholder substitution
// =============================================================================

/// Substitute `${{ parameters.NAME }}` placeholders throughout a YAML tree.
/// `$(NAME)` runtime macros are left untouched for dispatch-time
/// interpolation.
fn substitute_value(
    value: &Value,
    env: &HashMap<String, Value>,
    template: &str,
) -> ResolutionResult<Value> {
    match value {
        Value::String(s) => substitute_string(s, env, template),
        Value::Sequence(seq) => {
            let mut out = Vec::with_capacity(seq.len());
            for item in seq {
                out.push(substitute_value(item, env, template)?);
            }
            Ok(Value::Sequence(out))
        }
        Value::Mapping(map) => {
            let mut out = serde_yaml::Mapping::new();
            for (key, val) in map {
                out.insert(
                    substitute_value(key, env, template)?,
                    substitute_value(val, env, template)?,
                );
            }
            Ok(Value::Mapping(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_string(
    text: &str,
    env: &HashMap<String, Value>,
    template: &str,
) -> ResolutionResult<Value> {
    // A string that is exactly one placeholder keeps the bound value's
    // type, so boolean and object parameters survive substitution
    if let Some(name) = exact_placeholder(text) {
        return lookup(name, env, template).cloned();
    }

    if !text.contains("${{") {
        return Ok(Value::String(text.to_string()));
    }

    let mut result = String::new();
    let mut rest = text;
    while let Some(start) = rest.find("${{") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 3..];
        let end = after
            .find("}}")
            .ok_or_else(|| ResolutionError::MalformedTemplate {
                template: template.to_string(),
                reason: format!("unterminated placeholder in '{}'", text),
            })?;
        let name = placeholder_name(after[..end].trim(), template)?;
        let value = lookup(name, env, template)?;
        result.push_str(&scalar_string(value, name, template)?);
        rest = &after[end + 2..];
    }
    result.push_str(rest);
    Ok(Value::String(result))
}

/// If the whole string is a single placeholder, return its parameter name
fn exact_placeholder(text: &str) -> Option<&str> {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix("${{")?.strip_suffix("}}")?;
    if inner.contains("${{") {
        return None;
    }
    inner.trim().strip_prefix("parameters.")
}

fn placeholder_name<'t>(inner: &'t str, template: &str) -> ResolutionResult<&'t str> {
    inner
        .strip_prefix("parameters.")
        .map(str::trim)
        .ok_or_else(|| ResolutionError::UnresolvedPlaceholder {
            template: template.to_string(),
            placeholder: inner.to_string(),
        })
}

fn lookup<'e>(
    name: &str,
    env: &'e HashMap<String, Value>,
    template: &str,
) -> ResolutionResult<&'e Value> {
    env.get(name)
        .ok_or_else(|| ResolutionError::UnresolvedPlaceholder {
            template: template.to_string(),
            placeholder: format!("parameters.{}", name),
        })
}

/// Render a bound value for splicing into the middle of a string
fn scalar_string(value: &Value, name: &str, template: &str) -> ResolutionResult<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        Value::Sequence(_) | Value::Mapping(_) | Value::Tagged(_) => {
            Err(ResolutionError::MalformedTemplate {
                template: template.to_string(),
                reason: format!(
                    "parameter '{}' is not a scalar and cannot be spliced into a string",
                    name
                ),
            })
        }
    }
}
