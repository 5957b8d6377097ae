//! Execution monitors.
//!
//! Engines publish [`ExecutionEvent`]s to a [`MonitorHub`]; monitors are plain observers
//! that keep their own state and expose snapshots for polling. Nothing here feeds back
//! into execution.

mod errors;
mod event;
mod hub;
mod performance;
mod progress;

pub use errors::{ErrorMonitor, ErrorRecord, RepeatedErrorPattern};
pub use event::ExecutionEvent;
pub use hub::MonitorHub;
pub use performance::{PerformanceMonitor, PerformanceSummary, ResourceSample, ToolTiming};
pub use progress::{ProgressMonitor, ProgressSnapshot};

/// Receives every event of every run it is attached to.
///
/// Called on the hub's dispatcher thread, one event at a time in emit order. A slow
/// observer delays later deliveries, never the engine.
pub trait ExecutionObserver: Send + Sync {
    fn name(&self) -> &str;
    fn on_event(&self, event: &ExecutionEvent);
}
