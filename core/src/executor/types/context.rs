use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use super::step::{StepError, StepErrorKind, StepResult, StepStatus};
use crate::config::FailurePolicy;
use crate::context::Services;
use crate::executor::graph::ExecutionPlan;
use crate::monitor::{ExecutionEvent, MonitorHub};
use crate::workflow::{WorkflowDefinition, WorkflowStep};

/// Per-run state shared by the engine and every step task.
///
/// The result map is the only mutable state; each step writes its own entry once.
pub struct ExecutionContext {
    pub execution_id: String,
    pub started_at: DateTime<Utc>,
    pub definition: Arc<WorkflowDefinition>,
    pub plan: Arc<ExecutionPlan>,
    pub services: Services,
    pub monitors: Arc<MonitorHub>,
    pub policy: FailurePolicy,
    pub default_timeout: Duration,

    /// External cancellation.
    cancel: CancellationToken,
    /// Child of `cancel`, also fired when the abort policy trips.
    stop: CancellationToken,
    aborted: AtomicBool,

    step_index: HashMap<String, usize>,
    results: Mutex<BTreeMap<String, StepResult>>,
    warnings: Mutex<Vec<String>>,
    dispatched: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ExecutionContext {
    pub fn new(
        definition: Arc<WorkflowDefinition>,
        plan: Arc<ExecutionPlan>,
        services: Services,
        monitors: Arc<MonitorHub>,
        policy: FailurePolicy,
        default_timeout: Duration,
        cancel: CancellationToken,
    ) -> Self {
        let step_index = definition
            .steps
            .iter()
            .enumerate()
            .map(|(idx, step)| (step.id.clone(), idx))
            .collect();
        let stop = cancel.child_token();

        Self {
            execution_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            definition,
            plan,
            services,
            monitors,
            policy,
            default_timeout,
            cancel,
            stop,
            aborted: AtomicBool::new(false),
            step_index,
            results: Mutex::new(BTreeMap::new()),
            warnings: Mutex::new(Vec::new()),
            dispatched: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.step_index
            .get(step_id)
            .and_then(|idx| self.definition.steps.get(*idx))
    }

    pub fn emit(&self, event: ExecutionEvent) {
        self.monitors.emit(&event);
    }

    /// Record a step's result. The first write for a step wins.
    pub fn record(&self, result: StepResult) {
        let mut results = lock(&self.results);
        if results.contains_key(&result.step_id) {
            warn!(step_id = %result.step_id, "duplicate result for step ignored");
            return;
        }
        results.insert(result.step_id.clone(), result);
    }

    pub fn result(&self, step_id: &str) -> Option<StepResult> {
        lock(&self.results).get(step_id).cloned()
    }

    pub fn has_result(&self, step_id: &str) -> bool {
        lock(&self.results).contains_key(step_id)
    }

    pub fn results(&self) -> BTreeMap<String, StepResult> {
        lock(&self.results).clone()
    }

    /// Note a degradation that does not stop the run.
    pub fn warn(&self, message: impl Into<String>) {
        let message = message.into();
        warn!(execution_id = %self.execution_id, "{}", message);
        lock(&self.warnings).push(message);
    }

    pub fn warnings(&self) -> Vec<String> {
        lock(&self.warnings).clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    /// Whether dispatch of new steps must stop.
    pub fn should_stop(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Fires on external cancellation or abort.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Trip the abort policy: nothing new is dispatched and interruptible steps stop.
    pub fn abort(&self, reason: &str) {
        if !self.aborted.swap(true, Ordering::AcqRel) {
            warn!(execution_id = %self.execution_id, reason, "aborting run");
        }
        self.stop.cancel();
    }

    /// The reason a step may not run, if any.
    pub fn blocked_by(&self, step_id: &str) -> Option<StepError> {
        if self.is_cancelled() {
            return Some(StepError::new(StepErrorKind::Cancelled, "run cancelled"));
        }
        if self.is_aborted() {
            return Some(StepError::new(
                StepErrorKind::Aborted,
                "run aborted after a step failure",
            ));
        }
        if self.policy == FailurePolicy::Continue {
            return None;
        }

        let results = lock(&self.results);
        self.plan
            .upstream_of(step_id)
            .iter()
            .find(|dep| {
                results
                    .get(dep.as_str())
                    .is_some_and(|r| r.status != StepStatus::Succeeded)
            })
            .map(|dep| StepError::upstream_failed(dep))
    }

    /// Apply the failure policy after a step failed.
    pub fn on_step_failed(&self, step_id: &str) {
        match self.policy {
            FailurePolicy::Abort => self.abort(&format!("step '{step_id}' failed")),
            FailurePolicy::SkipDependents => {
                let dependents = self.plan.dependents_of(step_id);
                if !dependents.is_empty() {
                    info!(step_id, skipped = dependents.len(), "dependents will be skipped");
                }
            }
            FailurePolicy::Continue => {}
        }
    }

    /// Record and announce a step that will not be dispatched.
    pub fn skip(&self, step_id: &str, error: StepError) -> StepResult {
        let tool_id = self.step(step_id).map(|s| s.tool.clone()).unwrap_or_default();
        let result = StepResult::skipped(step_id, tool_id.clone(), error.clone());
        self.record(result.clone());
        self.emit(ExecutionEvent::StepSkipped {
            execution_id: self.execution_id.clone(),
            step_id: step_id.to_string(),
            tool_id,
            reason: error.kind,
            message: error.message,
        });
        result
    }

    /// Skip every planned step that has no result yet.
    pub fn skip_remaining(&self) {
        let reason = if self.is_cancelled() {
            StepError::new(StepErrorKind::Cancelled, "run cancelled")
        } else {
            StepError::new(StepErrorKind::Aborted, "run aborted after a step failure")
        };
        for step_id in self.plan.flatten() {
            if !self.has_result(&step_id) {
                self.skip(&step_id, reason.clone());
            }
        }
    }

    /// Returns the dispatch ordinal of the step entering flight.
    pub(crate) fn enter_flight(&self) -> usize {
        let index = self.dispatched.fetch_add(1, Ordering::AcqRel);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::AcqRel);
        index
    }

    pub(crate) fn leave_flight(&self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }

    pub fn steps_dispatched(&self) -> usize {
        self.dispatched.load(Ordering::Acquire)
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak_in_flight.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("execution_id", &self.execution_id)
            .field("workflow", &self.definition.name)
            .field("policy", &self.policy)
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
