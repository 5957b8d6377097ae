use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::reference::find_references;
use crate::error::{OrchestratorError, ValidationError};

/// A validated-on-submit, immutable description of a multi-step pipeline.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WorkflowDefinition {
    pub name: String,
    pub description: Option<String>,
    /// Steps in declaration order (phases flattened).
    pub steps: Vec<WorkflowStep>,
    pub outputs: OutputSpec,
}

/// One node of the workflow DAG.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStep {
    #[serde(alias = "step_id")]
    pub id: String,

    #[serde(alias = "tool_id")]
    pub tool: String,

    #[serde(default)]
    pub inputs: Map<String, Value>,

    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Hint that the step may share a batch slot with others.
    #[serde(default = "default_parallel", alias = "parallel_eligible")]
    pub parallel: bool,

    /// Key into the degradation-factor table; defaults to the tool id.
    #[serde(default)]
    pub operation_type: Option<String>,

    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_parallel() -> bool {
    true
}

/// Named group of steps; only used to structure documents.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Phase {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub steps: Vec<WorkflowStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AggregatorKind {
    #[default]
    Simple,
    Graph,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Text,
}

/// What the run exposes and how.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OutputSpec {
    #[serde(default)]
    pub aggregator: AggregatorKind,

    /// Identity field for graph nodes.
    #[serde(default = "default_node_key")]
    pub node_key: String,

    /// Identity fields for graph edges.
    #[serde(default = "default_edge_keys")]
    pub edge_keys: Vec<String>,

    /// name -> `${step.field}` reference
    #[serde(default)]
    pub expose: BTreeMap<String, String>,

    #[serde(default)]
    pub format: OutputFormat,
}

fn default_node_key() -> String {
    "id".to_string()
}

fn default_edge_keys() -> Vec<String> {
    vec!["source".to_string(), "target".to_string(), "type".to_string()]
}

impl Default for OutputSpec {
    fn default() -> Self {
        Self {
            aggregator: AggregatorKind::default(),
            node_key: default_node_key(),
            edge_keys: default_edge_keys(),
            expose: BTreeMap::new(),
            format: OutputFormat::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    steps: Vec<WorkflowStep>,
    #[serde(default)]
    phases: Vec<Phase>,
    #[serde(default)]
    outputs: OutputSpec,
}

impl From<RawDocument> for WorkflowDefinition {
    fn from(raw: RawDocument) -> Self {
        let mut steps = raw.steps;
        for phase in raw.phases {
            steps.extend(phase.steps);
        }
        Self {
            name: raw.name,
            description: raw.description,
            steps,
            outputs: raw.outputs,
        }
    }
}

impl WorkflowDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            steps: Vec::new(),
            outputs: OutputSpec::default(),
        }
    }

    pub fn with_step(mut self, step: WorkflowStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_outputs(mut self, outputs: OutputSpec) -> Self {
        self.outputs = outputs;
        self
    }

    pub fn from_yaml_str(s: &str) -> Result<Self, ValidationError> {
        serde_yaml::from_str::<RawDocument>(s)
            .map(Self::from)
            .map_err(|e| ValidationError::Parse(e.to_string()))
    }

    pub fn from_json_str(s: &str) -> Result<Self, ValidationError> {
        serde_json::from_str::<RawDocument>(s)
            .map(Self::from)
            .map_err(|e| ValidationError::Parse(e.to_string()))
    }

    /// Load a document, picking YAML for `.yaml`/`.yml` and JSON otherwise.
    pub fn from_path(path: &Path) -> Result<Self, OrchestratorError> {
        let text = std::fs::read_to_string(path)?;
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        let def = if is_yaml {
            Self::from_yaml_str(&text)?
        } else {
            Self::from_json_str(&text)?
        };
        Ok(def)
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == step_id)
    }

    /// Structural validation: ids, dependency targets and references must all exist.
    ///
    /// Cycles are left to the resolver.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(self.steps.len());
        for (idx, step) in self.steps.iter().enumerate() {
            if step.id.trim().is_empty() {
                return Err(ValidationError::EmptyStepId(idx));
            }
            if !seen.insert(step.id.as_str()) {
                return Err(ValidationError::DuplicateStepId(step.id.clone()));
            }
            if step.tool.trim().is_empty() {
                return Err(ValidationError::EmptyToolId(step.id.clone()));
            }
        }

        for step in &self.steps {
            for dep in &step.depends_on {
                if !seen.contains(dep.as_str()) {
                    return Err(ValidationError::DependencyNotFound {
                        step_id: step.id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
            for (param, value) in &step.inputs {
                for reference in find_references(value) {
                    if !seen.contains(reference.step_id.as_str()) {
                        return Err(ValidationError::UnknownReference {
                            step_id: step.id.clone(),
                            param: param.clone(),
                            missing_step: reference.step_id,
                        });
                    }
                }
            }
        }

        for (name, source) in &self.outputs.expose {
            for reference in find_references(&Value::String(source.clone())) {
                if !seen.contains(reference.step_id.as_str()) {
                    return Err(ValidationError::UnknownOutputReference {
                        name: name.clone(),
                        missing_step: reference.step_id,
                    });
                }
            }
        }

        Ok(())
    }
}

impl WorkflowStep {
    pub fn new(id: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            tool: tool.into(),
            inputs: Map::new(),
            depends_on: Vec::new(),
            parallel: true,
            operation_type: None,
            timeout_ms: None,
        }
    }

    pub fn input(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn depends_on(mut self, step_id: impl Into<String>) -> Self {
        self.depends_on.push(step_id.into());
        self
    }

    pub fn operation_type(mut self, op: impl Into<String>) -> Self {
        self.operation_type = Some(op.into());
        self
    }

    pub fn timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn sequential_only(mut self) -> Self {
        self.parallel = false;
        self
    }

    pub fn op_type(&self) -> &str {
        self.operation_type.as_deref().unwrap_or(&self.tool)
    }

    /// Steps whose outputs this step's inputs reference, in first-seen order.
    pub fn referenced_steps(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for value in self.inputs.values() {
            for reference in find_references(value) {
                if !out.contains(&reference.step_id) {
                    out.push(reference.step_id);
                }
            }
        }
        out
    }

    /// Explicit dependencies followed by inferred ones, deduplicated.
    pub fn dependencies(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(self.depends_on.len());
        for dep in self.depends_on.iter().cloned().chain(self.referenced_steps()) {
            if !out.contains(&dep) {
                out.push(dep);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
name: literature-review
phases:
  - name: ingest
    steps:
      - id: load
        tool: echo
        inputs:
          path: papers/
  - name: analyse
    steps:
      - id: entities
        tool: echo
        operation_type: extract_entities
        inputs:
          text: "${load.path}"
      - id: summary
        tool: template
        depends_on: [load]
        parallel: false
        inputs:
          text: "found ${entities.count} entities"
outputs:
  aggregator: graph
  expose:
    entities: "${entities}"
"#;

    #[test]
    fn test_yaml_phases_flatten_in_order() {
        let def = WorkflowDefinition::from_yaml_str(YAML).unwrap();
        let ids: Vec<_> = def.steps.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["load", "entities", "summary"]);
        assert_eq!(def.outputs.aggregator, AggregatorKind::Graph);
        assert_eq!(def.outputs.node_key, "id");
        assert!(!def.step("summary").unwrap().parallel);
        def.validate().unwrap();
    }

    #[test]
    fn test_dependencies_merge_explicit_and_inferred() {
        let def = WorkflowDefinition::from_yaml_str(YAML).unwrap();
        let summary = def.step("summary").unwrap();
        assert_eq!(summary.dependencies(), vec!["load".to_string(), "entities".to_string()]);
        assert_eq!(def.step("entities").unwrap().op_type(), "extract_entities");
        assert_eq!(def.step("load").unwrap().op_type(), "echo");
    }

    #[test]
    fn test_json_document() {
        let def = WorkflowDefinition::from_json_str(
            r#"{"name": "j", "steps": [{"step_id": "a", "tool_id": "echo", "parallel_eligible": false}]}"#,
        )
        .unwrap();
        assert_eq!(def.steps[0].id, "a");
        assert_eq!(def.steps[0].tool, "echo");
        assert!(!def.steps[0].parallel);
    }

    #[test]
    fn test_validate_unknown_depends_on() {
        let def = WorkflowDefinition::new("bad")
            .with_step(WorkflowStep::new("a", "echo"))
            .with_step(WorkflowStep::new("b", "echo").depends_on("ghost"));
        assert_eq!(
            def.validate(),
            Err(ValidationError::DependencyNotFound {
                step_id: "b".into(),
                missing_dep: "ghost".into()
            })
        );
    }

    #[test]
    fn test_validate_unknown_reference_and_duplicates() {
        let def = WorkflowDefinition::new("bad")
            .with_step(WorkflowStep::new("a", "echo").input("x", "${nowhere.out}"));
        assert!(matches!(
            def.validate(),
            Err(ValidationError::UnknownReference { .. })
        ));

        let def = WorkflowDefinition::new("dup")
            .with_step(WorkflowStep::new("a", "echo"))
            .with_step(WorkflowStep::new("a", "echo"));
        assert_eq!(def.validate(), Err(ValidationError::DuplicateStepId("a".into())));

        let def = WorkflowDefinition::new("empty").with_step(WorkflowStep::new(" ", "echo"));
        assert_eq!(def.validate(), Err(ValidationError::EmptyStepId(0)));
    }

    #[test]
    fn test_malformed_document_is_parse_error() {
        let err = WorkflowDefinition::from_yaml_str("steps: [").unwrap_err();
        assert!(matches!(err, ValidationError::Parse(_)));
    }
}
