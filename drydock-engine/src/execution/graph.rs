// Stage Dependency Graph
// Builds a DAG from the resolved pipeline and derives execution waves

use crate::parser::models::{ResolvedPipeline, ResolvedStage};

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Error type for graph construction
#[derive(Debug, Clone)]
pub struct GraphError {
    pub message: String,
    pub kind: GraphErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphErrorKind {
    /// Circular dependency detected
    CyclicDependency,
    /// Reference to an unknown stage
    UnknownDependency,
    /// Invalid pipeline structure
    InvalidStructure,
}

impl fmt::Display for GraphError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph error: {}", self.message)
    }
}

impl std::error::Error for GraphError {}

impl GraphError {
    pub fn cyclic(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::CyclicDependency,
        }
    }

    pub fn unknown_dependency(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::UnknownDependency,
        }
    }

    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: GraphErrorKind::InvalidStructure,
        }
    }
}

/// The stage dependency graph of a resolved pipeline.
///
/// Construction validates the graph: every dependency must name a declared
/// stage and the edges must form a DAG. A valid graph yields a wave
/// partition where wave 0 holds the stages with no dependencies and wave k
/// holds the stages whose dependencies all sit in earlier waves.
#[derive(Debug, Clone)]
pub struct StageGraph {
    /// All stages, in declaration order
    pub stages: Vec<ResolvedStage>,
    /// Quick lookup of stage index by name
    stage_indices: HashMap<String, usize>,
}

impl StageGraph {
    /// Build and validate the graph from a resolved pipeline
    pub fn build(pipeline: &ResolvedPipeline) -> Result<Self, GraphError> {
        let mut stage_indices = HashMap::new();
        for (i, stage) in pipeline.stages.iter().enumerate() {
            if stage_indices.insert(stage.name.clone(), i).is_some() {
                return Err(GraphError::invalid_structure(format!(
                    "duplicate stage name '{}'",
                    stage.name
                )));
            }
        }

        let graph = Self {
            stages: pipeline.stages.clone(),
            stage_indices,
        };

        graph.validate()?;
        Ok(graph)
    }

    /// Check that all dependencies exist and the graph is acyclic
    fn validate(&self) -> Result<(), GraphError> {
        for stage in &self.stages {
            for dep in &stage.depends_on {
                if !self.stage_indices.contains_key(dep) {
                    return Err(GraphError::unknown_dependency(format!(
                        "stage '{}' depends on unknown stage '{}'",
                        stage.name, dep
                    )));
                }
            }
        }

        self.detect_cycles()
    }

    /// Detect cycles with DFS; the error names the offending chain
    fn detect_cycles(&self) -> Result<(), GraphError> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for stage in &self.stages {
            if !visited.contains(stage.name.as_str()) {
                if let Some(cycle) = self.dfs_cycle(stage, &mut visited, &mut rec_stack) {
                    return Err(GraphError::cyclic(format!(
                        "circular dependency detected in stages: {}",
                        cycle.join(" -> ")
                    )));
                }
            }
        }

        Ok(())
    }

    fn dfs_cycle(
        &self,
        node: &ResolvedStage,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.name.clone());
        rec_stack.insert(node.name.clone());

        for dep in &node.depends_on {
            if !visited.contains(dep) {
                if let Some(idx) = self.stage_indices.get(dep) {
                    if let Some(mut cycle) = self.dfs_cycle(&self.stages[*idx], visited, rec_stack)
                    {
                        cycle.insert(0, node.name.clone());
                        return Some(cycle);
                    }
                }
            } else if rec_stack.contains(dep) {
                return Some(vec![node.name.clone(), dep.clone()]);
            }
        }

        rec_stack.remove(&node.name);
        None
    }

    /// Get stages in topological order via Kahn's algorithm.
    /// Ties break on declaration order so the result is deterministic.
    pub fn topological_order(&self) -> Vec<&ResolvedStage> {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut adj_list: HashMap<&str, Vec<&str>> = HashMap::new();

        for stage in &self.stages {
            in_degree.entry(stage.name.as_str()).or_insert(0);
            adj_list.entry(stage.name.as_str()).or_default();

            for dep in &stage.depends_on {
                adj_list.entry(dep.as_str()).or_default().push(&stage.name);
                *in_degree.entry(stage.name.as_str()).or_insert(0) += 1;
            }
        }

        let mut queue: VecDeque<&str> = self
            .stages
            .iter()
            .map(|s| s.name.as_str())
            .filter(|name| in_degree[name] == 0)
            .collect();

        let mut result = Vec::with_capacity(self.stages.len());

        while let Some(name) = queue.pop_front() {
            if let Some(idx) = self.stage_indices.get(name) {
                result.push(&self.stages[*idx]);
            }

            if let Some(neighbors) = adj_list.get(name) {
                for &neighbor in neighbors {
                    if let Some(deg) = in_degree.get_mut(neighbor) {
                        *deg -= 1;
                        if *deg == 0 {
                            queue.push_back(neighbor);
                        }
                    }
                }
            }
        }

        result
    }

    /// Partition stages into execution waves: each stage lands one wave
    /// past its deepest dependency
    pub fn waves(&self) -> Vec<Vec<&ResolvedStage>> {
        let mut waves: Vec<Vec<&ResolvedStage>> = Vec::new();
        let mut assigned: HashMap<&str, usize> = HashMap::new();

        for stage in self.topological_order() {
            let wave = stage
                .depends_on
                .iter()
                .filter_map(|dep| assigned.get(dep.as_str()))
                .max()
                .map(|w| w + 1)
                .unwrap_or(0);

            assigned.insert(stage.name.as_str(), wave);

            if wave >= waves.len() {
                waves.resize(wave + 1, Vec::new());
            }
            waves[wave].push(stage);
        }

        waves
    }

    /// Get a stage by name
    pub fn get_stage(&self, name: &str) -> Option<&ResolvedStage> {
        self.stage_indices.get(name).map(|&idx| &self.stages[idx])
    }
}
