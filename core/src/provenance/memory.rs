use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::types::{duration_between, LineageDirection, LineageEdge, Operation, ProvenanceStatistics};
use super::{ProvenanceRecorder, ProvenanceResult};
use crate::error::ProvenanceError;

#[derive(Default)]
struct Inner {
    operations: HashMap<String, Operation>,
    /// Insertion order of operation ids.
    order: Vec<String>,
    lineage: Vec<LineageEdge>,
}

/// Append-only, process-lifetime provenance store.
#[derive(Default)]
pub struct InMemoryProvenance {
    inner: Mutex<Inner>,
}

impl InMemoryProvenance {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// All operations in the order they were started.
    pub fn operations(&self) -> Vec<Operation> {
        let inner = self.lock();
        inner
            .order
            .iter()
            .filter_map(|id| inner.operations.get(id).cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ProvenanceRecorder for InMemoryProvenance {
    fn name(&self) -> &str {
        "memory"
    }

    fn start_operation(
        &self,
        tool_id: &str,
        operation_type: &str,
        inputs: &Value,
        parameters: &Map<String, Value>,
    ) -> ProvenanceResult<String> {
        let operation_id = Uuid::new_v4().to_string();
        let op = Operation {
            operation_id: operation_id.clone(),
            tool_id: tool_id.to_string(),
            operation_type: operation_type.to_string(),
            inputs: inputs.clone(),
            outputs: Value::Null,
            parameters: parameters.clone(),
            success: None,
            error_message: None,
            metadata: Map::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
        };

        let mut inner = self.lock();
        inner.order.push(operation_id.clone());
        inner.operations.insert(operation_id.clone(), op);
        Ok(operation_id)
    }

    fn complete_operation(
        &self,
        operation_id: &str,
        outputs: &Value,
        success: bool,
        error_message: Option<&str>,
        metadata: Option<&Map<String, Value>>,
    ) -> ProvenanceResult<i64> {
        let mut inner = self.lock();
        let op = inner
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| ProvenanceError::OperationNotFound(operation_id.to_string()))?;
        if op.is_completed() {
            return Err(ProvenanceError::AlreadyCompleted(operation_id.to_string()));
        }

        let completed_at = Utc::now().max(op.started_at);
        let duration_ms = duration_between(op.started_at, completed_at);

        op.outputs = outputs.clone();
        op.success = Some(success);
        op.error_message = error_message.map(str::to_string);
        if let Some(meta) = metadata {
            op.metadata = meta.clone();
        }
        op.completed_at = Some(completed_at);
        op.duration_ms = Some(duration_ms);
        Ok(duration_ms)
    }

    fn add_lineage(
        &self,
        source_operation_id: &str,
        target_operation_id: &str,
        relationship_type: &str,
    ) -> ProvenanceResult<()> {
        if source_operation_id == target_operation_id {
            return Err(ProvenanceError::SelfLoop(source_operation_id.to_string()));
        }
        let mut inner = self.lock();
        for id in [source_operation_id, target_operation_id] {
            if !inner.operations.contains_key(id) {
                return Err(ProvenanceError::OperationNotFound(id.to_string()));
            }
        }
        inner.lineage.push(LineageEdge {
            source_operation_id: source_operation_id.to_string(),
            target_operation_id: target_operation_id.to_string(),
            relationship_type: relationship_type.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    fn get_lineage(
        &self,
        operation_id: &str,
        direction: LineageDirection,
    ) -> ProvenanceResult<Vec<LineageEdge>> {
        let inner = self.lock();
        if !inner.operations.contains_key(operation_id) {
            return Err(ProvenanceError::OperationNotFound(operation_id.to_string()));
        }
        Ok(inner
            .lineage
            .iter()
            .filter(|e| {
                (direction.includes_upstream() && e.target_operation_id == operation_id)
                    || (direction.includes_downstream() && e.source_operation_id == operation_id)
            })
            .cloned()
            .collect())
    }

    fn get_operation(&self, operation_id: &str) -> ProvenanceResult<Operation> {
        self.lock()
            .operations
            .get(operation_id)
            .cloned()
            .ok_or_else(|| ProvenanceError::OperationNotFound(operation_id.to_string()))
    }

    fn get_statistics(&self) -> ProvenanceResult<ProvenanceStatistics> {
        let inner = self.lock();
        let mut stats = ProvenanceStatistics {
            total_operations: inner.operations.len(),
            lineage_edges: inner.lineage.len(),
            ..ProvenanceStatistics::default()
        };

        let mut total_duration: i64 = 0;
        for op in inner.operations.values() {
            *stats.per_tool_counts.entry(op.tool_id.clone()).or_insert(0) += 1;
            match op.success {
                Some(true) => stats.success_count += 1,
                Some(false) => stats.failure_count += 1,
                None => stats.pending_count += 1,
            }
            total_duration += op.duration_ms.unwrap_or(0);
        }

        let completed = stats.success_count + stats.failure_count;
        if completed > 0 {
            stats.average_duration_ms = total_duration as f64 / completed as f64;
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn test_round_trip() {
        contract::start_complete_round_trip(&InMemoryProvenance::new());
    }

    #[test]
    fn test_unknown_operation() {
        contract::unknown_operation_is_error(&InMemoryProvenance::new());
    }

    #[test]
    fn test_double_completion() {
        contract::double_completion_is_error(&InMemoryProvenance::new());
    }

    #[test]
    fn test_lineage_symmetry() {
        contract::lineage_symmetry(&InMemoryProvenance::new());
    }

    #[test]
    fn test_lineage_guards() {
        contract::lineage_guards(&InMemoryProvenance::new());
    }

    #[test]
    fn test_operations_keep_start_order() {
        let rec = InMemoryProvenance::new();
        let a = rec.start_operation("a", "a", &Value::Null, &Map::new()).unwrap();
        let b = rec.start_operation("b", "b", &Value::Null, &Map::new()).unwrap();
        let ids: Vec<_> = rec.operations().into_iter().map(|o| o.operation_id).collect();
        assert_eq!(ids, vec![a, b]);
        assert_eq!(rec.get_statistics().unwrap().pending_count, 2);
    }
}
