// Pipeline Definition Models
// Typed model for declarative build-verification pipelines

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// =============================================================================
// Pipeline Definition
// =============================================================================

/// A declarative pipeline definition as parsed from YAML.
///
/// Stage declaration order is a hint only; execution order is governed by
/// the dependency graph built from each stage's `dependsOn` entries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineDefinition {
    /// Optional pipeline name
    #[serde(default)]
    pub name: Option<String>,

    /// External resources (template repositories)
    #[serde(default)]
    pub resources: Resources,

    /// Stages of the pipeline
    #[serde(default)]
    pub stages: Vec<Stage>,
}

impl PipelineDefinition {
    /// The pipeline name, or a placeholder when none was declared
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    /// Look up a declared template repository by alias
    pub fn repository(&self, alias: &str) -> Option<&TemplateRepository> {
        self.resources
            .repositories
            .iter()
            .find(|r| r.alias == alias)
    }
}

/// External resources referenced by the pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Resources {
    /// Template repositories, referenced by alias from job template references
    #[serde(default)]
    pub repositories: Vec<TemplateRepository>,
}

/// A repository that hosts job/step templates.
///
/// Declared once under `resources.repositories`, then referenced by alias
/// from any job via `template: path/to/template.yml@alias`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateRepository {
    /// Alias used in template references
    #[serde(rename = "repository")]
    pub alias: String,

    /// Repository kind (e.g. "git")
    #[serde(rename = "type", default = "default_repository_kind")]
    pub kind: String,

    /// Where the repository lives; interpretation is up to the template source
    pub location: String,
}

fn default_repository_kind() -> String {
    "git".to_string()
}

// =============================================================================
// Stages, Jobs, Steps
// =============================================================================

/// A named unit of the pipeline with declared dependencies on other stages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    /// Stage name, unique across the pipeline
    pub stage: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Names of stages that must complete before this one becomes eligible.
    /// Absent means no dependencies: the stage runs in the first wave.
    #[serde(default)]
    pub depends_on: DependsOn,

    /// Jobs within this stage; mutually independent, dispatched concurrently
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

/// The `dependsOn` field accepts a single name or a list of names
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependsOn {
    #[default]
    None,
    Single(String),
    Multiple(Vec<String>),
}

impl DependsOn {
    pub fn as_vec(&self) -> Vec<String> {
        match self {
            DependsOn::None => Vec::new(),
            DependsOn::Single(name) => vec![name.clone()],
            DependsOn::Multiple(names) => names.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            DependsOn::None => true,
            DependsOn::Single(_) => false,
            DependsOn::Multiple(names) => names.is_empty(),
        }
    }
}

/// A unit of work within a stage: either inline steps or an external
/// template reference, never both and never neither (enforced by the
/// definition validator before anything executes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    /// Job name
    pub job: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Job-level failure policy: a failing job with `allowFail: true` does
    /// not fail its stage
    #[serde(default)]
    pub allow_fail: bool,

    /// Inline steps
    #[serde(default)]
    pub steps: Vec<StepSpec>,

    /// Template reference of the form `path/to/template.yml@alias`
    #[serde(default)]
    pub template: Option<String>,

    /// Parameters bound to the template reference
    #[serde(default)]
    pub parameters: HashMap<String, serde_yaml::Value>,
}

/// Tagged view of a job spec, for exhaustive handling at consumers
#[derive(Debug)]
pub enum JobKind<'a> {
    /// Inline steps declared directly on the job
    Inline(&'a [StepSpec]),
    /// Reference to an external template with bound parameters
    Template {
        reference: &'a str,
        parameters: &'a HashMap<String, serde_yaml::Value>,
    },
}

impl JobSpec {
    /// Classify this job as inline or template-referencing.
    ///
    /// Returns `None` for malformed jobs (both or neither); the definition
    /// validator rejects those shapes before resolution.
    pub fn kind(&self) -> Option<JobKind<'_>> {
        match (&self.template, self.steps.is_empty()) {
            (Some(reference), true) => Some(JobKind::Template {
                reference,
                parameters: &self.parameters,
            }),
            (None, false) => Some(JobKind::Inline(&self.steps)),
            _ => None,
        }
    }
}

/// The smallest executable unit of work, opaque to the orchestrator beyond
/// its failure-tolerance flag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSpec {
    /// Step name
    pub name: String,

    /// The action to perform; handed verbatim to the step runner
    pub action: String,

    /// Step-level failure policy: a failing step with `continueOnError: true`
    /// does not halt its job
    #[serde(default)]
    pub continue_on_error: bool,

    /// Extra environment variables for this step
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Per-step timeout override; the executor default applies when absent
    #[serde(default)]
    pub timeout_in_minutes: Option<u64>,
}

// =============================================================================
// Template Documents
// =============================================================================

/// A parameter declared by a template document
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    /// Parameter name
    pub name: String,

    /// Human-readable name
    #[serde(default)]
    pub display_name: Option<String>,

    /// Expected value shape
    #[serde(rename = "type", default)]
    pub param_type: ParameterType,

    /// Default value; a parameter without one is required
    #[serde(default)]
    pub default: Option<serde_yaml::Value>,

    /// Allowed values, when restricted
    #[serde(default)]
    pub values: Option<Vec<serde_yaml::Value>>,
}

/// Value shapes a template parameter can declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterType {
    #[default]
    String,
    Number,
    Boolean,
    Object,
}

impl ParameterType {
    pub fn name(&self) -> &'static str {
        match self {
            ParameterType::String => "string",
            ParameterType::Number => "number",
            ParameterType::Boolean => "boolean",
            ParameterType::Object => "object",
        }
    }

    /// Whether a provided value matches this declared shape
    pub fn matches(&self, value: &serde_yaml::Value) -> bool {
        match self {
            ParameterType::String => {
                value.is_string() || value.is_number() || value.is_bool()
            }
            ParameterType::Number => {
                value.is_number()
                    || value
                        .as_str()
                        .map(|s| s.parse::<f64>().is_ok())
                        .unwrap_or(false)
            }
            ParameterType::Boolean => {
                value.is_bool()
                    || value
                        .as_str()
                        .map(|s| s == "true" || s == "false")
                        .unwrap_or(false)
            }
            ParameterType::Object => value.is_mapping() || value.is_sequence(),
        }
    }
}

// =============================================================================
// Resolved Model
// =============================================================================

/// A fully resolved pipeline: every template reference expanded into
/// concrete steps. Created once per run and immutable thereafter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPipeline {
    pub name: String,
    pub stages: Vec<ResolvedStage>,
}

/// A stage with its jobs resolved to concrete step lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedStage {
    pub name: String,
    pub display_name: Option<String>,
    pub depends_on: Vec<String>,
    pub jobs: Vec<ResolvedJob>,
}

/// A job after template expansion: a flat list of steps with no remaining
/// template references
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJob {
    pub name: String,
    pub display_name: Option<String>,
    pub allow_fail: bool,
    pub steps: Vec<StepSpec>,
}
