// Execution Context
// Runtime variables and environment carried across a pipeline run

use std::collections::HashMap;
use std::path::PathBuf;

/// Lookup interface for `$(NAME)` runtime variables
pub trait VariableStore: Send + Sync {
    fn get(&self, name: &str) -> Option<String>;
}

impl VariableStore for HashMap<String, String> {
    fn get(&self, name: &str) -> Option<String> {
        HashMap::get(self, name).cloned()
    }
}

/// Context threaded through a pipeline run.
///
/// Holds the runtime variables for `$(NAME)` interpolation and the base
/// environment every step inherits. Template placeholders are long gone by
/// the time this is consulted; only runtime macros remain.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub pipeline_name: String,
    pub working_dir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    variables: HashMap<String, String>,
}

impl ExecutionContext {
    pub fn new(pipeline_name: impl Into<String>) -> Self {
        Self {
            pipeline_name: pipeline_name.into(),
            working_dir: None,
            env: HashMap::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    pub fn variable(&self, name: &str) -> Option<&str> {
        self.variables.get(name).map(String::as_str)
    }

    /// Replace `$(NAME)` macros with values from this context's variables.
    /// Unknown macros are left verbatim so shell constructs like `$(pwd)`
    /// pass through.
    pub fn interpolate(&self, text: &str) -> String {
        self.interpolate_with(text, &self.variables)
    }

    /// Interpolate against an arbitrary variable store
    pub fn interpolate_with(&self, text: &str, store: &dyn VariableStore) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("$(") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find(')') {
                Some(end) => {
                    let name = &after[..end];
                    match store.get(name) {
                        Some(value) => result.push_str(&value),
                        None => {
                            result.push_str("$(");
                            result.push_str(name);
                            result.push(')');
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }

    /// Build the environment for one step: the context's base environment
    /// overlaid with the step's own, both interpolated
    pub fn step_env(&self, step_env: &HashMap<String, String>) -> HashMap<String, String> {
        let mut env = self.env.clone();
        for (key, value) in step_env {
            env.insert(key.clone(), self.interpolate(value));
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolate_known_variable() {
        let ctx = ExecutionContext::new("verify").with_variable("BUILD_ID", "42");
        assert_eq!(ctx.interpolate("echo $(BUILD_ID)"), "echo 42");
    }

    #[test]
    fn test_unknown_variable_left_verbatim() {
        let ctx = ExecutionContext::new("verify");
        assert_eq!(ctx.interpolate("cd $(pwd)/src"), "cd $(pwd)/src");
    }

    #[test]
    fn test_multiple_occurrences() {
        let ctx = ExecutionContext::new("verify")
            .with_variable("A", "1")
            .with_variable("B", "2");
        assert_eq!(ctx.interpolate("$(A) and $(B) and $(A)"), "1 and 2 and 1");
    }

    #[test]
    fn test_unterminated_macro_passes_through() {
        let ctx = ExecutionContext::new("verify").with_variable("A", "1");
        assert_eq!(ctx.interpolate("echo $(A"), "echo $(A");
    }

    #[test]
    fn test_interpolate_with_custom_store() {
        struct EnvStore;
        impl VariableStore for EnvStore {
            fn get(&self, name: &str) -> Option<String> {
                (name == "HOST").then(|| "ci-worker-3".to_string())
            }
        }

        let ctx = ExecutionContext::new("verify");
        assert_eq!(
            ctx.interpolate_with("ssh $(HOST)", &EnvStore),
            "ssh ci-worker-3"
        );
    }

    #[test]
    fn test_step_env_overlays_and_interpolates() {
        let ctx = ExecutionContext::new("verify")
            .with_env("RUST_BACKTRACE", "1")
            .with_variable("TOOLCHAIN", "nightly");

        let mut step_env = HashMap::new();
        step_env.insert("CHANNEL".to_string(), "$(TOOLCHAIN)".to_string());

        let env = ctx.step_env(&step_env);
        assert_eq!(env.get("RUST_BACKTRACE").map(String::as_str), Some("1"));
        assert_eq!(env.get("CHANNEL").map(String::as_str), Some("nightly"));
    }
}
