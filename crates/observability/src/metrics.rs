//! Camera session metrics
//!
//! Thin wrappers over the `metrics` facade plus an in-memory aggregator used
//! for end-of-run summaries.

use std::collections::BTreeMap;

use contracts::Size;
use metrics::{counter, gauge, histogram};

/// Record a step state transition (`state` is the state entered)
pub fn record_step_transition(step: &str, state: &str) {
    counter!(
        "camera_session_step_transitions_total",
        "step" => step.to_string(),
        "state" => state.to_string()
    )
    .increment(1);
}

/// Record a failed step operation
pub fn record_step_failure(step: &str, kind: &str) {
    counter!(
        "camera_session_step_failures_total",
        "step" => step.to_string(),
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record how an engine error was handled: `restarted`, `surfaced` or `defect`
pub fn record_engine_error(outcome: &str) {
    counter!(
        "camera_session_engine_errors_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the latency of a queued lifecycle operation
pub fn record_lifecycle_latency_ms(operation: &str, latency_ms: f64, success: bool) {
    let status = if success { "success" } else { "failure" };
    histogram!(
        "camera_session_lifecycle_latency_ms",
        "operation" => operation.to_string()
    )
    .record(latency_ms);
    counter!(
        "camera_session_lifecycle_operations_total",
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a negotiated size (`kind` is e.g. `capture` or `preview`)
pub fn record_resolved_size(kind: &str, size: Size) {
    gauge!("camera_session_resolved_width", "kind" => kind.to_string()).set(size.width as f64);
    gauge!("camera_session_resolved_height", "kind" => kind.to_string()).set(size.height as f64);
}

/// Lifecycle metrics aggregator
///
/// Aggregates in memory so a run can print a summary.
#[derive(Debug, Clone, Default)]
pub struct LifecycleAggregator {
    /// Per-operation latency (ms)
    pub latency: BTreeMap<String, RunningStats>,

    /// Per-operation failure count
    pub failures: BTreeMap<String, u64>,

    /// Camera errors surfaced to the listener
    pub surfaced_errors: u64,

    /// Automatic restarts after transient errors
    pub auto_restarts: u64,
}

impl LifecycleAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one operation outcome
    pub fn record(&mut self, operation: &str, latency_ms: f64, success: bool) {
        self.latency
            .entry(operation.to_string())
            .or_default()
            .push(latency_ms);
        if !success {
            *self.failures.entry(operation.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_surfaced_error(&mut self) {
        self.surfaced_errors += 1;
    }

    pub fn record_auto_restart(&mut self) {
        self.auto_restarts += 1;
    }

    /// Build the summary report
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_operations: self.latency.values().map(|s| s.count()).sum(),
            total_failures: self.failures.values().sum(),
            surfaced_errors: self.surfaced_errors,
            auto_restarts: self.auto_restarts,
            latency_ms: self
                .latency
                .iter()
                .map(|(op, stats)| (op.clone(), StatsSummary::from(stats)))
                .collect(),
        }
    }
}

/// Metrics summary
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub total_operations: u64,
    pub total_failures: u64,
    pub surfaced_errors: u64,
    pub auto_restarts: u64,
    pub latency_ms: BTreeMap<String, StatsSummary>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Camera Session Summary ===")?;
        writeln!(f, "Lifecycle operations: {}", self.total_operations)?;
        writeln!(f, "Failed operations: {}", self.total_failures)?;
        writeln!(f, "Surfaced camera errors: {}", self.surfaced_errors)?;
        writeln!(f, "Automatic restarts: {}", self.auto_restarts)?;

        if !self.latency_ms.is_empty() {
            writeln!(f, "Latency (ms):")?;
            for (operation, stats) in &self.latency_ms {
                writeln!(f, "  {}: {}", operation, stats)?;
            }
        }

        Ok(())
    }
}

/// Stats summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min().unwrap_or_default(),
            max: stats.max().unwrap_or_default(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Streaming latency statistics, updated one sample at a time
/// (Welford mean and variance).
#[derive(Debug, Clone, Copy)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    sum_sq_dev: f64,
    min: f64,
    max: f64,
}

impl Default for RunningStats {
    fn default() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            sum_sq_dev: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl RunningStats {
    pub fn push(&mut self, sample: f64) {
        self.count += 1;
        self.min = self.min.min(sample);
        self.max = self.max.max(sample);

        let before = sample - self.mean;
        self.mean += before / self.count as f64;
        self.sum_sq_dev += before * (sample - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, 0 below two samples
    pub fn variance(&self) -> f64 {
        match self.count {
            0 | 1 => 0.0,
            n => self.sum_sq_dev / (n - 1) as f64,
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// `None` before the first sample
    pub fn min(&self) -> Option<f64> {
        (self.count > 0).then_some(self.min)
    }

    /// `None` before the first sample
    pub fn max(&self) -> Option<f64> {
        (self.count > 0).then_some(self.max)
    }
}

impl Extend<f64> for RunningStats {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, samples: I) {
        samples.into_iter().for_each(|sample| self.push(sample));
    }
}
