use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

use super::{ExecutionEvent, ExecutionObserver};

/// Point-in-time view of run progress.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub current_step_index: usize,
    pub total_steps: usize,
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub is_active: bool,
    pub percent: f64,
}

impl ProgressSnapshot {
    pub fn finished_steps(&self) -> usize {
        self.completed + self.failed + self.skipped
    }
}

/// Step counters kept in atomics; reading a snapshot never takes a lock.
#[derive(Debug, Default)]
pub struct ProgressMonitor {
    current_step_index: AtomicUsize,
    total_steps: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    skipped: AtomicUsize,
    active: AtomicBool,
    finished: AtomicBool,
}

impl ProgressMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let total_steps = self.total_steps.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Acquire);
        let failed = self.failed.load(Ordering::Acquire);
        let skipped = self.skipped.load(Ordering::Acquire);
        let is_active = self.active.load(Ordering::Acquire);

        let done = completed + failed + skipped;
        let percent = if total_steps == 0 {
            if self.finished.load(Ordering::Acquire) {
                100.0
            } else {
                0.0
            }
        } else {
            (done.min(total_steps) as f64 / total_steps as f64) * 100.0
        };

        ProgressSnapshot {
            current_step_index: self.current_step_index.load(Ordering::Acquire),
            total_steps,
            completed,
            failed,
            skipped,
            is_active,
            percent,
        }
    }

    fn reset(&self, total_steps: usize) {
        self.current_step_index.store(0, Ordering::Release);
        self.completed.store(0, Ordering::Release);
        self.failed.store(0, Ordering::Release);
        self.skipped.store(0, Ordering::Release);
        self.finished.store(false, Ordering::Release);
        self.total_steps.store(total_steps, Ordering::Release);
        self.active.store(true, Ordering::Release);
    }
}

impl ExecutionObserver for ProgressMonitor {
    fn name(&self) -> &str {
        "progress"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted { total_steps, .. } => self.reset(*total_steps),
            ExecutionEvent::StepStarted { index, .. } => {
                self.current_step_index.fetch_max(*index, Ordering::AcqRel);
            }
            ExecutionEvent::StepCompleted { success, .. } => {
                let counter = if *success { &self.completed } else { &self.failed };
                counter.fetch_add(1, Ordering::AcqRel);
            }
            ExecutionEvent::StepSkipped { .. } => {
                self.skipped.fetch_add(1, Ordering::AcqRel);
            }
            ExecutionEvent::RunCompleted { .. } => {
                self.active.store(false, Ordering::Release);
                self.finished.store(true, Ordering::Release);
            }
            ExecutionEvent::BatchStarted { .. } | ExecutionEvent::BatchCompleted { .. } => {}
        }
    }
}
