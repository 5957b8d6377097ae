use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{ExecutionEvent, ExecutionObserver};
use crate::executor::types::StepErrorKind;

/// Most recent failures kept for [`ErrorMonitor::records`].
const MAX_RECORDS: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub execution_id: String,
    pub step_id: String,
    pub tool_id: String,
    pub kind: StepErrorKind,
    pub message: String,
}

/// The same tool failing across several distinct steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepeatedErrorPattern {
    pub tool_id: String,
    pub step_ids: Vec<String>,
    pub kinds: Vec<StepErrorKind>,
    pub occurrences: usize,
}

#[derive(Debug, Default)]
struct ToolFailures {
    occurrences: usize,
    /// Distinct failing steps, first failure first.
    step_ids: Vec<String>,
    seen_steps: HashSet<String>,
    kinds: BTreeSet<StepErrorKind>,
    reported: bool,
}

#[derive(Debug, Default)]
struct Inner {
    total: usize,
    recent: VecDeque<ErrorRecord>,
    by_tool: BTreeMap<String, ToolFailures>,
    by_kind: BTreeMap<StepErrorKind, usize>,
}

/// Collects step failures by tool and by kind. Counters accumulate across runs until
/// cleared; only the latest records are retained.
#[derive(Debug)]
pub struct ErrorMonitor {
    repeat_threshold: usize,
    inner: Mutex<Inner>,
}

impl Default for ErrorMonitor {
    fn default() -> Self {
        Self::new(2)
    }
}

impl ErrorMonitor {
    pub fn new(repeat_threshold: usize) -> Self {
        Self {
            repeat_threshold: repeat_threshold.max(1),
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn record(&self, record: ErrorRecord) {
        let mut inner = self.lock();
        inner.total += 1;
        *inner.by_kind.entry(record.kind).or_default() += 1;

        let tool = inner.by_tool.entry(record.tool_id.clone()).or_default();
        tool.occurrences += 1;
        tool.kinds.insert(record.kind);
        if tool.seen_steps.insert(record.step_id.clone()) {
            tool.step_ids.push(record.step_id.clone());
        }
        if !tool.reported && tool.step_ids.len() >= self.repeat_threshold {
            tool.reported = true;
            warn!(
                tool_id = %record.tool_id,
                steps = tool.step_ids.len(),
                "repeated tool failures detected"
            );
        }

        inner.recent.push_back(record);
        while inner.recent.len() > MAX_RECORDS {
            inner.recent.pop_front();
        }
    }

    /// Failures recorded since creation or the last [`clear`](Self::clear).
    pub fn total(&self) -> usize {
        self.lock().total
    }

    /// The most recent failures, oldest first.
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock().recent.iter().cloned().collect()
    }

    pub fn errors_by_tool(&self) -> BTreeMap<String, usize> {
        self.lock()
            .by_tool
            .iter()
            .map(|(tool, failures)| (tool.clone(), failures.occurrences))
            .collect()
    }

    pub fn errors_by_kind(&self) -> BTreeMap<StepErrorKind, usize> {
        self.lock().by_kind.clone()
    }

    /// Patterns at the configured threshold.
    pub fn repeated_patterns(&self) -> Vec<RepeatedErrorPattern> {
        self.patterns(self.repeat_threshold)
    }

    /// Tools that failed in at least `min_occurrences` distinct steps, sorted by tool id.
    pub fn patterns(&self, min_occurrences: usize) -> Vec<RepeatedErrorPattern> {
        self.lock()
            .by_tool
            .iter()
            .filter(|(_, failures)| failures.step_ids.len() >= min_occurrences.max(1))
            .map(|(tool_id, failures)| RepeatedErrorPattern {
                tool_id: tool_id.clone(),
                step_ids: failures.step_ids.clone(),
                kinds: failures.kinds.iter().copied().collect(),
                occurrences: failures.occurrences,
            })
            .collect()
    }

    pub fn clear(&self) {
        *self.lock() = Inner::default();
    }
}

impl ExecutionObserver for ErrorMonitor {
    fn name(&self) -> &str {
        "errors"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        if let ExecutionEvent::StepCompleted {
            execution_id,
            step_id,
            tool_id,
            success: false,
            error_kind,
            error,
            ..
        } = event
        {
            self.record(ErrorRecord {
                execution_id: execution_id.clone(),
                step_id: step_id.clone(),
                tool_id: tool_id.clone(),
                kind: error_kind.unwrap_or(StepErrorKind::ToolFailed),
                message: error.clone().unwrap_or_default(),
            });
        }
    }
}
