use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{ExecutionEvent, ExecutionObserver};
use crate::config::MonitoringConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSample {
    pub at: DateTime<Utc>,
    /// Mean usage across all CPUs, 0-100.
    pub cpu_percent: f32,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
}

impl ResourceSample {
    pub fn memory_percent(&self) -> f32 {
        (self.memory_used_bytes as f32 / self.memory_total_bytes.max(1) as f32) * 100.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTiming {
    pub count: usize,
    pub total_ms: u64,
    pub max_ms: u64,
}

impl ToolTiming {
    pub fn mean_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_ms as f64 / self.count as f64
        }
    }

    fn record(&mut self, duration_ms: u64) {
        self.count += 1;
        self.total_ms += duration_ms;
        self.max_ms = self.max_ms.max(duration_ms);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub samples: usize,
    pub peak_cpu_percent: f32,
    pub mean_cpu_percent: f32,
    pub peak_memory_bytes: u64,
    pub tools: BTreeMap<String, ToolTiming>,
}

type SampleWindow = Arc<Mutex<VecDeque<ResourceSample>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn push_bounded(window: &Mutex<VecDeque<ResourceSample>>, capacity: usize, sample: ResourceSample) {
    let mut samples = lock(window);
    samples.push_back(sample);
    while samples.len() > capacity {
        samples.pop_front();
    }
}

/// Samples CPU and memory on a background task and records per-tool step durations.
pub struct PerformanceMonitor {
    interval: Duration,
    window: usize,
    samples: SampleWindow,
    tools: Mutex<BTreeMap<String, ToolTiming>>,
    sampler: Mutex<Option<CancellationToken>>,
}

impl PerformanceMonitor {
    pub fn new(interval: Duration, window: usize) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(10)),
            window: window.max(1),
            samples: Arc::new(Mutex::new(VecDeque::new())),
            tools: Mutex::new(BTreeMap::new()),
            sampler: Mutex::new(None),
        }
    }

    pub fn from_config(config: &MonitoringConfig) -> Self {
        Self::new(
            Duration::from_millis(config.sample_interval_ms),
            config.window,
        )
    }

    /// Start the sampling task on the current tokio runtime.
    ///
    /// Returns false if no runtime is available or sampling is already running.
    pub fn start(&self) -> bool {
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!(error = %e, "performance sampling needs a tokio runtime");
                return false;
            }
        };

        let mut sampler = lock(&self.sampler);
        if sampler.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let cancel = token.clone();
        let samples = self.samples.clone();
        let window = self.window;
        let period = self.interval;

        handle.spawn(async move {
            let mut sys = sysinfo::System::new();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        push_bounded(&samples, window, take_sample(&mut sys));
                    }
                }
            }
            debug!("performance sampler stopped");
        });

        *sampler = Some(token);
        true
    }

    pub fn stop(&self) {
        if let Some(token) = lock(&self.sampler).take() {
            token.cancel();
        }
    }

    pub fn is_sampling(&self) -> bool {
        lock(&self.sampler).is_some()
    }

    pub fn record_sample(&self, sample: ResourceSample) {
        push_bounded(&self.samples, self.window, sample);
    }

    pub fn samples(&self) -> Vec<ResourceSample> {
        lock(&self.samples).iter().cloned().collect()
    }

    pub fn record_duration(&self, tool_id: &str, duration_ms: u64) {
        lock(&self.tools)
            .entry(tool_id.to_string())
            .or_default()
            .record(duration_ms);
    }

    pub fn tool_timings(&self) -> BTreeMap<String, ToolTiming> {
        lock(&self.tools).clone()
    }

    pub fn summary(&self) -> PerformanceSummary {
        let samples = lock(&self.samples);
        let count = samples.len();
        let peak_cpu_percent = samples.iter().map(|s| s.cpu_percent).fold(0.0, f32::max);
        let mean_cpu_percent = if count == 0 {
            0.0
        } else {
            samples.iter().map(|s| s.cpu_percent).sum::<f32>() / count as f32
        };
        let peak_memory_bytes = samples
            .iter()
            .map(|s| s.memory_used_bytes)
            .max()
            .unwrap_or(0);
        drop(samples);

        PerformanceSummary {
            samples: count,
            peak_cpu_percent,
            mean_cpu_percent,
            peak_memory_bytes,
            tools: self.tool_timings(),
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

fn take_sample(sys: &mut sysinfo::System) -> ResourceSample {
    sys.refresh_cpu();
    sys.refresh_memory();
    let cpu_count = sys.cpus().len().max(1);
    let cpu_percent = sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / cpu_count as f32;
    ResourceSample {
        at: Utc::now(),
        cpu_percent,
        memory_used_bytes: sys.used_memory(),
        memory_total_bytes: sys.total_memory(),
    }
}

impl ExecutionObserver for PerformanceMonitor {
    fn name(&self) -> &str {
        "performance"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        if let ExecutionEvent::StepCompleted {
            tool_id,
            duration_ms,
            ..
        } = event
        {
            self.record_duration(tool_id, *duration_ms);
        }
    }
}
