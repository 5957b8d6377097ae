use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, ValidationError};
use crate::workflow::WorkflowDefinition;

/// Step dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct StepGraph {
    /// Dependency edges: step_id -> steps it depends on
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: step_id -> steps that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Declaration order (for stable sorting)
    insertion_order: Vec<String>,
}

/// Resolved execution order: successive batches of steps whose dependencies are all in
/// earlier batches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionPlan {
    pub batches: Vec<Vec<String>>,

    /// step_id -> direct dependencies, in declaration order
    #[serde(default)]
    pub dependencies: BTreeMap<String, Vec<String>>,
}

impl StepGraph {
    /// Construct the graph from explicit `depends_on` edges and inferred input references.
    pub fn from_definition(definition: &WorkflowDefinition) -> Result<Self, ValidationError> {
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::with_capacity(definition.steps.len());

        for step in &definition.steps {
            if edges.contains_key(&step.id) {
                return Err(ValidationError::DuplicateStepId(step.id.clone()));
            }

            let dependencies = step.dependencies();
            for dep in &dependencies {
                reverse_edges
                    .entry(dep.clone())
                    .or_default()
                    .push(step.id.clone());
            }
            edges.insert(step.id.clone(), dependencies);
            insertion_order.push(step.id.clone());
        }

        Ok(Self {
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    pub fn len(&self) -> usize {
        self.insertion_order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insertion_order.is_empty()
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        for step_id in &self.insertion_order {
            for dep in &self.edges[step_id] {
                if !self.edges.contains_key(dep) {
                    return Err(ValidationError::DependencyNotFound {
                        step_id: step_id.clone(),
                        missing_dep: dep.clone(),
                    }
                    .into());
                }
            }
        }

        if let Some(steps) = self.detect_cycle() {
            return Err(OrchestratorError::Cycle { steps });
        }

        Ok(())
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Steps in the same batch have no dependencies on each other. Within a batch, steps
    /// keep their declaration order.
    ///
    /// # Time Complexity
    ///
    /// O(V log V + E) where V = number of steps, E = number of dependencies
    pub fn resolve(&self) -> Result<ExecutionPlan, OrchestratorError> {
        self.validate()?;

        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();

        // edges[A] = [B, C] means A depends on B and C, so A's in-degree is 2
        let mut in_degree: HashMap<&str, usize> = self
            .edges
            .iter()
            .map(|(id, deps)| (id.as_str(), deps.len()))
            .collect();

        let mut current: Vec<&str> = self
            .insertion_order
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree[id] == 0)
            .collect();

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();

            let mut next: Vec<&str> = Vec::new();
            for step_id in &current {
                let Some(dependents) = self.reverse_edges.get(*step_id) else {
                    continue;
                };
                for dependent in dependents {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(dependent.as_str());
                        }
                    }
                }
            }
            next.sort_by_key(|id| position.get(id).copied().unwrap_or(usize::MAX));

            batches.push(current.iter().map(|s| s.to_string()).collect());
            current = next;
        }

        // validate() already rejects cycles; this guards the invariant
        if processed != self.len() {
            return Err(OrchestratorError::Cycle {
                steps: self.detect_cycle().unwrap_or_default(),
            });
        }

        let dependencies = self
            .edges
            .iter()
            .map(|(id, deps)| (id.clone(), deps.clone()))
            .collect();

        Ok(ExecutionPlan {
            batches,
            dependencies,
        })
    }

    /// Detect circular dependencies using DFS, visiting steps in declaration order so the
    /// reported path is deterministic.
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for step_id in &self.insertion_order {
            if !visited.contains(step_id) && self.dfs_cycle(step_id, &mut visited, &mut stack) {
                return Some(stack);
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

impl ExecutionPlan {
    /// Steps in execution order.
    pub fn flatten(&self) -> Vec<String> {
        self.batches.iter().flatten().cloned().collect()
    }

    pub fn total_steps(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Index of the batch containing `step_id`.
    pub fn batch_of(&self, step_id: &str) -> Option<usize> {
        self.batches
            .iter()
            .position(|batch| batch.iter().any(|id| id == step_id))
    }

    /// Direct dependencies of a step.
    pub fn upstream_of(&self, step_id: &str) -> &[String] {
        self.dependencies
            .get(step_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// All steps that transitively depend on `step_id`, in execution order.
    pub fn dependents_of(&self, step_id: &str) -> Vec<String> {
        let mut reverse: HashMap<&str, Vec<&str>> = HashMap::new();
        for (id, deps) in &self.dependencies {
            for dep in deps {
                reverse.entry(dep.as_str()).or_default().push(id.as_str());
            }
        }

        let mut reached: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([step_id]);
        while let Some(current) = queue.pop_front() {
            for &next in reverse.get(current).into_iter().flatten() {
                if reached.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        self.flatten()
            .into_iter()
            .filter(|id| reached.contains(id.as_str()))
            .collect()
    }
}
