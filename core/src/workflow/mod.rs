//! Declarative workflow documents.
//!
//! A workflow is a named list of steps; each step names a tool and its inputs.
//! Inputs may reference upstream outputs with `${step_id}` or `${step_id.field}`,
//! which also implies a dependency edge between the two steps.

mod definition;
mod reference;

pub use definition::{
    AggregatorKind, OutputFormat, OutputSpec, Phase, WorkflowDefinition, WorkflowStep,
};
pub use reference::{find_references, resolve_inputs, resolve_value, StepReference};
