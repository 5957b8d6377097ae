use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use super::types::{duration_between, LineageDirection, LineageEdge, Operation, ProvenanceStatistics};
use super::{ProvenanceRecorder, ProvenanceResult};
use crate::error::ProvenanceError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS operations (
    operation_id TEXT PRIMARY KEY,
    tool_id TEXT NOT NULL,
    operation_type TEXT NOT NULL,
    inputs TEXT NOT NULL,
    parameters TEXT NOT NULL,
    outputs TEXT,
    success INTEGER,
    error_message TEXT,
    metadata TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT,
    duration INTEGER
);

CREATE INDEX IF NOT EXISTS idx_operations_tool ON operations(tool_id);
CREATE INDEX IF NOT EXISTS idx_operations_started ON operations(started_at);

CREATE TABLE IF NOT EXISTS lineage (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_operation_id TEXT NOT NULL REFERENCES operations(operation_id),
    target_operation_id TEXT NOT NULL REFERENCES operations(operation_id),
    relationship_type TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_lineage_source ON lineage(source_operation_id);
CREATE INDEX IF NOT EXISTS idx_lineage_target ON lineage(target_operation_id);
";

const OPERATION_COLUMNS: &str = "operation_id, tool_id, operation_type, inputs, parameters, \
     outputs, success, error_message, metadata, started_at, completed_at, duration";

/// SQLite-backed provenance store.
pub struct SqliteProvenance {
    conn: Mutex<Connection>,
}

impl SqliteProvenance {
    /// Open or create a database at the given path.
    pub fn open(path: &Path) -> ProvenanceResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                ProvenanceError::Store(format!("Failed to create db directory: {}", e))
            })?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        conn.execute_batch(SCHEMA)?;

        debug!(path = %path.display(), "provenance store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> ProvenanceResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn exists(conn: &Connection, operation_id: &str) -> ProvenanceResult<bool> {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM operations WHERE operation_id = ?1",
                params![operation_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> ProvenanceResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ProvenanceError::Store(format!("bad timestamp '{s}': {e}")))
}

fn to_json_text<T: serde::Serialize>(value: &T) -> ProvenanceResult<String> {
    serde_json::to_string(value).map_err(|e| ProvenanceError::Store(e.to_string()))
}

fn parse_json(s: Option<String>) -> ProvenanceResult<Value> {
    match s {
        Some(text) => {
            serde_json::from_str(&text).map_err(|e| ProvenanceError::Store(e.to_string()))
        }
        None => Ok(Value::Null),
    }
}

fn parse_object(s: Option<String>) -> ProvenanceResult<Map<String, Value>> {
    match parse_json(s)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

/// Column values as stored; decoded after the row borrow ends.
struct OperationRow {
    operation_id: String,
    tool_id: String,
    operation_type: String,
    inputs: Option<String>,
    parameters: Option<String>,
    outputs: Option<String>,
    success: Option<bool>,
    error_message: Option<String>,
    metadata: Option<String>,
    started_at: String,
    completed_at: Option<String>,
    duration: Option<i64>,
}

impl OperationRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            operation_id: row.get(0)?,
            tool_id: row.get(1)?,
            operation_type: row.get(2)?,
            inputs: row.get(3)?,
            parameters: row.get(4)?,
            outputs: row.get(5)?,
            success: row.get(6)?,
            error_message: row.get(7)?,
            metadata: row.get(8)?,
            started_at: row.get(9)?,
            completed_at: row.get(10)?,
            duration: row.get(11)?,
        })
    }

    fn decode(self) -> ProvenanceResult<Operation> {
        Ok(Operation {
            operation_id: self.operation_id,
            tool_id: self.tool_id,
            operation_type: self.operation_type,
            inputs: parse_json(self.inputs)?,
            outputs: parse_json(self.outputs)?,
            parameters: parse_object(self.parameters)?,
            success: self.success,
            error_message: self.error_message,
            metadata: parse_object(self.metadata)?,
            started_at: parse_ts(&self.started_at)?,
            completed_at: self.completed_at.as_deref().map(parse_ts).transpose()?,
            duration_ms: self.duration,
        })
    }
}

impl ProvenanceRecorder for SqliteProvenance {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn start_operation(
        &self,
        tool_id: &str,
        operation_type: &str,
        inputs: &Value,
        parameters: &Map<String, Value>,
    ) -> ProvenanceResult<String> {
        let operation_id = Uuid::new_v4().to_string();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO operations (operation_id, tool_id, operation_type, inputs, parameters, started_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                operation_id,
                tool_id,
                operation_type,
                to_json_text(inputs)?,
                to_json_text(parameters)?,
                format_ts(Utc::now()),
            ],
        )?;
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
        let conn = self.lock();
        let existing: Option<(String, Option<String>)> = conn
            .query_row(
                "SELECT started_at, completed_at FROM operations WHERE operation_id = ?1",
                params![operation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((started_at, completed_at)) = existing else {
            return Err(ProvenanceError::OperationNotFound(operation_id.to_string()));
        };
        if completed_at.is_some() {
            return Err(ProvenanceError::AlreadyCompleted(operation_id.to_string()));
        }

        let started_at = parse_ts(&started_at)?;
        // Round-trip through the stored format so the stored pair reproduces the duration
        let completed_at = parse_ts(&format_ts(Utc::now().max(started_at)))?;
        let duration_ms = duration_between(started_at, completed_at);
        let metadata = metadata.cloned().unwrap_or_default();

        conn.execute(
            "UPDATE operations
             SET outputs = ?2, success = ?3, error_message = ?4, metadata = ?5,
                 completed_at = ?6, duration = ?7
             WHERE operation_id = ?1",
            params![
                operation_id,
                to_json_text(outputs)?,
                success,
                error_message,
                to_json_text(&metadata)?,
                format_ts(completed_at),
                duration_ms,
            ],
        )?;
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
        let conn = self.lock();
        for id in [source_operation_id, target_operation_id] {
            if !Self::exists(&conn, id)? {
                return Err(ProvenanceError::OperationNotFound(id.to_string()));
            }
        }
        conn.execute(
            "INSERT INTO lineage (source_operation_id, target_operation_id, relationship_type, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                source_operation_id,
                target_operation_id,
                relationship_type,
                format_ts(Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn get_lineage(
        &self,
        operation_id: &str,
        direction: LineageDirection,
    ) -> ProvenanceResult<Vec<LineageEdge>> {
        let conn = self.lock();
        if !Self::exists(&conn, operation_id)? {
            return Err(ProvenanceError::OperationNotFound(operation_id.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT source_operation_id, target_operation_id, relationship_type, created_at
             FROM lineage
             WHERE (?2 AND target_operation_id = ?1) OR (?3 AND source_operation_id = ?1)
             ORDER BY id",
        )?;
        let rows = stmt.query_map(
            params![
                operation_id,
                direction.includes_upstream(),
                direction.includes_downstream()
            ],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;

        let mut edges = Vec::new();
        for row in rows {
            let (source, target, relationship_type, created_at) = row?;
            edges.push(LineageEdge {
                source_operation_id: source,
                target_operation_id: target,
                relationship_type,
                created_at: parse_ts(&created_at)?,
            });
        }
        Ok(edges)
    }

    fn get_operation(&self, operation_id: &str) -> ProvenanceResult<Operation> {
        let conn = self.lock();
        let row = conn
            .query_row(
                &format!("SELECT {OPERATION_COLUMNS} FROM operations WHERE operation_id = ?1"),
                params![operation_id],
                OperationRow::from_row,
            )
            .optional()?;
        row.ok_or_else(|| ProvenanceError::OperationNotFound(operation_id.to_string()))?
            .decode()
    }

    fn get_statistics(&self) -> ProvenanceResult<ProvenanceStatistics> {
        let conn = self.lock();
        let (total, success, failure, pending, avg): (
            i64,
            Option<i64>,
            Option<i64>,
            Option<i64>,
            Option<f64>,
        ) = conn.query_row(
            "SELECT COUNT(*),
                    SUM(CASE WHEN success = 1 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN success = 0 THEN 1 ELSE 0 END),
                    SUM(CASE WHEN success IS NULL THEN 1 ELSE 0 END),
                    AVG(CASE WHEN completed_at IS NOT NULL THEN duration END)
             FROM operations",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
        )?;

        let mut stats = ProvenanceStatistics {
            total_operations: total as usize,
            success_count: success.unwrap_or(0) as usize,
            failure_count: failure.unwrap_or(0) as usize,
            pending_count: pending.unwrap_or(0) as usize,
            average_duration_ms: avg.unwrap_or(0.0),
            ..ProvenanceStatistics::default()
        };

        let mut stmt = conn.prepare("SELECT tool_id, COUNT(*) FROM operations GROUP BY tool_id")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?;
        for row in rows {
            let (tool, count) = row?;
            stats.per_tool_counts.insert(tool, count as usize);
        }

        let edges: i64 = conn.query_row("SELECT COUNT(*) FROM lineage", [], |row| row.get(0))?;
        stats.lineage_edges = edges as usize;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::super::contract;
    use super::*;

    #[test]
    fn test_round_trip() {
        contract::start_complete_round_trip(&SqliteProvenance::in_memory().unwrap());
    }

    #[test]
    fn test_unknown_operation() {
        contract::unknown_operation_is_error(&SqliteProvenance::in_memory().unwrap());
    }

    #[test]
    fn test_double_completion() {
        contract::double_completion_is_error(&SqliteProvenance::in_memory().unwrap());
    }

    #[test]
    fn test_lineage_symmetry() {
        contract::lineage_symmetry(&SqliteProvenance::in_memory().unwrap());
    }

    #[test]
    fn test_lineage_guards() {
        contract::lineage_guards(&SqliteProvenance::in_memory().unwrap());
    }

    #[test]
    fn test_reopen_file_keeps_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("prov.db");

        let id = {
            let store = SqliteProvenance::open(&path).unwrap();
            let id = store
                .start_operation("echo", "echo", &Value::Null, &Map::new())
                .unwrap();
            store
                .complete_operation(&id, &serde_json::json!([1, 2]), true, None, None)
                .unwrap();
            id
        };

        let store = SqliteProvenance::open(&path).unwrap();
        let op = store.get_operation(&id).unwrap();
        assert_eq!(op.outputs, serde_json::json!([1, 2]));
        assert_eq!(store.get_statistics().unwrap().total_operations, 1);
    }

    #[test]
    fn test_schema_has_required_indexes() {
        let store = SqliteProvenance::in_memory().unwrap();
        let conn = store.lock();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'index' ORDER BY name")
            .unwrap();
        let names: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(Result::ok)
            .collect();
        for expected in [
            "idx_lineage_source",
            "idx_lineage_target",
            "idx_operations_started",
            "idx_operations_tool",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {expected}");
        }
    }
}
