use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use lineflow_core::monitor::{ExecutionEvent, ExecutionObserver};
use lineflow_core::ExecutionStatus;

/// Progress bars on stderr: one overall bar plus a spinner per running step.
pub struct ProgressBars {
    multi: MultiProgress,
    overall: ProgressBar,
    step_bars: Mutex<HashMap<String, ProgressBar>>,
}

impl ProgressBars {
    pub fn new() -> Self {
        let multi = MultiProgress::new();
        let overall = multi.add(ProgressBar::new(0));
        if let Ok(style) = ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} steps ({percent}%) {msg}")
        {
            overall.set_style(style.progress_chars("█▓▒░  "));
        }
        overall.set_message("Starting...");

        Self {
            multi,
            overall,
            step_bars: Mutex::new(HashMap::new()),
        }
    }

    fn add_step(&self, step_id: &str) {
        let bar = self.multi.add(ProgressBar::new_spinner());
        if let Ok(style) = ProgressStyle::default_spinner().template("  {spinner:.green} {msg}") {
            bar.set_style(style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]));
        }
        bar.set_message(format!("⏳ {step_id}"));
        bar.enable_steady_tick(Duration::from_millis(100));

        if let Ok(mut bars) = self.step_bars.lock() {
            bars.insert(step_id.to_string(), bar);
        }
    }

    fn finish_step(&self, step_id: &str, message: String) {
        let bar = self
            .step_bars
            .lock()
            .ok()
            .and_then(|mut bars| bars.remove(step_id));
        if let Some(bar) = bar {
            bar.finish_with_message(message);
        }
        self.overall.inc(1);
    }
}

impl Default for ProgressBars {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionObserver for ProgressBars {
    fn name(&self) -> &str {
        "progress-bars"
    }

    fn on_event(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::RunStarted {
                workflow,
                total_steps,
                ..
            } => {
                self.overall.set_length(*total_steps as u64);
                self.overall.set_position(0);
                self.overall.set_message(workflow.clone());
            }
            ExecutionEvent::BatchStarted { batch_index, .. } => {
                self.overall.set_message(format!("Batch {}", batch_index + 1));
            }
            ExecutionEvent::StepStarted { step_id, .. } => self.add_step(step_id),
            ExecutionEvent::StepCompleted {
                step_id,
                success,
                duration_ms,
                ..
            } => {
                let icon = if *success { "✅" } else { "❌" };
                self.finish_step(step_id, format!("{icon} {step_id} ({duration_ms}ms)"));
            }
            ExecutionEvent::StepSkipped {
                step_id, reason, ..
            } => {
                self.overall.inc(1);
                let _ = self.multi.println(format!("  ⏭ {step_id} skipped ({reason})"));
            }
            ExecutionEvent::BatchCompleted { .. } => {}
            ExecutionEvent::RunCompleted { status, .. } => {
                let msg = match status {
                    ExecutionStatus::Success => "✅ All steps completed",
                    ExecutionStatus::Partial => "⚠ Completed with failures",
                    ExecutionStatus::Failure => "❌ Execution failed",
                };
                self.overall.finish_with_message(msg);
            }
        }
    }
}

impl Drop for ProgressBars {
    fn drop(&mut self) {
        if let Ok(mut bars) = self.step_bars.lock() {
            for (_, bar) in bars.drain() {
                bar.finish_and_clear();
            }
        }
    }
}
