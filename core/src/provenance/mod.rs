//! Provenance recording: one operation per tool invocation, plus lineage edges
//! describing which operation's output another was derived from.
//!
//! Two recorders ship with the core: an append-only in-memory store and a
//! SQLite store using the `operations` / `lineage` schema.

mod memory;
mod sqlite;
mod types;

pub use memory::InMemoryProvenance;
pub use sqlite::SqliteProvenance;
pub use types::{
    duration_between, LineageDirection, LineageEdge, Operation, ProvenanceStatistics,
    ProvenanceTrail, DERIVED_FROM,
};

use serde_json::{Map, Value};

use crate::error::ProvenanceError;

pub type ProvenanceResult<T> = Result<T, ProvenanceError>;

/// Recorder interface backed by some store. Implementations serialize their own writes.
pub trait ProvenanceRecorder: Send + Sync {
    fn name(&self) -> &str;

    /// Record the start of an operation and return its generated id.
    fn start_operation(
        &self,
        tool_id: &str,
        operation_type: &str,
        inputs: &Value,
        parameters: &Map<String, Value>,
    ) -> ProvenanceResult<String>;

    /// Mark an operation completed; returns the recorded duration in milliseconds.
    fn complete_operation(
        &self,
        operation_id: &str,
        outputs: &Value,
        success: bool,
        error_message: Option<&str>,
        metadata: Option<&Map<String, Value>>,
    ) -> ProvenanceResult<i64>;

    /// Both endpoints must already exist and differ.
    fn add_lineage(
        &self,
        source_operation_id: &str,
        target_operation_id: &str,
        relationship_type: &str,
    ) -> ProvenanceResult<()>;

    fn get_lineage(
        &self,
        operation_id: &str,
        direction: LineageDirection,
    ) -> ProvenanceResult<Vec<LineageEdge>>;

    fn get_operation(&self, operation_id: &str) -> ProvenanceResult<Operation>;

    fn get_statistics(&self) -> ProvenanceResult<ProvenanceStatistics>;

    /// Operations and the lineage edges between them, for a set of ids, in the given order.
    fn trail(&self, operation_ids: &[String]) -> ProvenanceResult<ProvenanceTrail> {
        let mut trail = ProvenanceTrail::default();
        for id in operation_ids {
            trail.operations.push(self.get_operation(id)?);
        }
        for id in operation_ids {
            for edge in self.get_lineage(id, LineageDirection::Upstream)? {
                if operation_ids.contains(&edge.source_operation_id) {
                    trail.lineage.push(edge);
                }
            }
        }
        Ok(trail)
    }
}

#[cfg(test)]
pub(crate) mod contract {
    //! Behaviour every recorder must share.

    use super::*;
    use serde_json::json;

    pub fn start_complete_round_trip(rec: &dyn ProvenanceRecorder) {
        let id = rec
            .start_operation("echo", "load_document", &json!({"path": "a"}), &Map::new())
            .unwrap();
        let duration = rec
            .complete_operation(&id, &json!({"ok": true}), true, None, None)
            .unwrap();

        let op = rec.get_operation(&id).unwrap();
        let completed = op.completed_at.expect("completed");
        assert!(completed >= op.started_at);
        assert_eq!(op.duration_ms, Some(duration));
        assert_eq!(duration, (completed - op.started_at).num_milliseconds());
        assert_eq!(op.success, Some(true));
        assert_eq!(op.outputs, json!({"ok": true}));
        assert_eq!(op.inputs, json!({"path": "a"}));

        let stats = rec.get_statistics().unwrap();
        assert_eq!(stats.total_operations, 1);
        assert_eq!(stats.success_count, 1);
        assert_eq!(stats.failure_count, 0);
        assert_eq!(stats.per_tool_counts.get("echo"), Some(&1));
    }

    pub fn unknown_operation_is_error(rec: &dyn ProvenanceRecorder) {
        let err = rec
            .complete_operation("nope", &Value::Null, true, None, None)
            .unwrap_err();
        assert_eq!(err, ProvenanceError::OperationNotFound("nope".into()));
        assert!(rec.get_operation("nope").is_err());
    }

    pub fn double_completion_is_error(rec: &dyn ProvenanceRecorder) {
        let id = rec
            .start_operation("echo", "echo", &Value::Null, &Map::new())
            .unwrap();
        rec.complete_operation(&id, &Value::Null, false, Some("boom"), None)
            .unwrap();
        let err = rec
            .complete_operation(&id, &Value::Null, true, None, None)
            .unwrap_err();
        assert_eq!(err, ProvenanceError::AlreadyCompleted(id.clone()));
        let op = rec.get_operation(&id).unwrap();
        assert_eq!(op.error_message.as_deref(), Some("boom"));
        assert_eq!(rec.get_statistics().unwrap().failure_count, 1);
    }

    pub fn lineage_symmetry(rec: &dyn ProvenanceRecorder) {
        let a = rec.start_operation("t", "t", &Value::Null, &Map::new()).unwrap();
        let b = rec.start_operation("t", "t", &Value::Null, &Map::new()).unwrap();
        let c = rec.start_operation("u", "u", &Value::Null, &Map::new()).unwrap();
        rec.add_lineage(&a, &b, DERIVED_FROM).unwrap();
        rec.add_lineage(&b, &c, DERIVED_FROM).unwrap();

        let up: Vec<_> = rec
            .get_lineage(&b, LineageDirection::Upstream)
            .unwrap()
            .into_iter()
            .map(|e| e.source_operation_id)
            .collect();
        assert_eq!(up, vec![a.clone()]);

        let down: Vec<_> = rec
            .get_lineage(&a, LineageDirection::Downstream)
            .unwrap()
            .into_iter()
            .map(|e| e.target_operation_id)
            .collect();
        assert_eq!(down, vec![b.clone()]);

        assert_eq!(rec.get_lineage(&b, LineageDirection::Both).unwrap().len(), 2);

        let trail = rec.trail(&[a.clone(), b.clone(), c.clone()]).unwrap();
        assert_eq!(trail.operations.len(), 3);
        assert_eq!(trail.lineage.len(), 2);

        assert_eq!(rec.get_statistics().unwrap().lineage_edges, 2);
    }

    pub fn lineage_guards(rec: &dyn ProvenanceRecorder) {
        let a = rec.start_operation("t", "t", &Value::Null, &Map::new()).unwrap();
        assert_eq!(
            rec.add_lineage(&a, &a, DERIVED_FROM),
            Err(ProvenanceError::SelfLoop(a.clone()))
        );
        assert_eq!(
            rec.add_lineage(&a, "missing", DERIVED_FROM),
            Err(ProvenanceError::OperationNotFound("missing".into()))
        );
        assert_eq!(
            rec.add_lineage("missing", &a, DERIVED_FROM),
            Err(ProvenanceError::OperationNotFound("missing".into()))
        );
        assert!(rec.get_lineage(&a, LineageDirection::Both).unwrap().is_empty());
    }
}
