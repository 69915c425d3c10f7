//! Session statistics.

use std::time::Duration;

use contracts::{CameraError, Facing, Mode, Size};
use engine::EngineEvent;
use observability::LifecycleAggregator;
use serde::Serialize;

/// Listener callbacks seen during a run
#[derive(Debug, Clone, Default, Serialize)]
pub struct EventCounts {
    pub opened: u64,
    pub closed: u64,
    pub errors: u64,
    pub preview_changes: u64,
}

/// Negotiated sizes at one point of the script, view frame
#[derive(Debug, Clone, Serialize)]
pub struct SizeReport {
    pub label: String,
    pub facing: Facing,
    pub mode: Mode,
    pub capture: Option<Size>,
    pub preview: Option<Size>,
    pub snapshot: Option<Size>,
}

/// Statistics from a session run
#[derive(Debug, Clone, Default)]
pub struct SessionStats {
    pub duration: Duration,
    pub events: EventCounts,
    pub last_error: Option<CameraError>,
    pub sizes: Vec<SizeReport>,
    pub lifecycle: LifecycleAggregator,
}

impl SessionStats {
    pub fn record_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::CameraOpened(_) => self.events.opened += 1,
            EngineEvent::CameraClosed => self.events.closed += 1,
            EngineEvent::Error(error) => {
                self.events.errors += 1;
                self.lifecycle.record_surfaced_error();
                self.last_error = Some(error.clone());
            }
            EngineEvent::PreviewStreamSizeChanged(_) => self.events.preview_changes += 1,
        }
    }

    /// JSON form of the summary
    pub fn to_json(&self) -> serde_json::Value {
        let summary = self.lifecycle.summary();
        serde_json::json!({
            "duration_secs": self.duration.as_secs_f64(),
            "events": self.events,
            "last_error": self.last_error.as_ref().map(ToString::to_string),
            "sizes": self.sizes,
            "operations": summary.total_operations,
            "failed_operations": summary.total_failures,
            "auto_restarts": summary.auto_restarts,
            "latency_ms": summary
                .latency_ms
                .iter()
                .map(|(op, stats)| (op.clone(), serde_json::json!({
                    "count": stats.count,
                    "min": stats.min,
                    "max": stats.max,
                    "mean": stats.mean,
                })))
                .collect::<serde_json::Map<_, _>>(),
        })
    }

    pub fn print_summary(&self) {
        println!("\n=== Session Statistics ===\n");
        println!("Overview");
        println!("   Duration: {:.3}s", self.duration.as_secs_f64());
        println!("   Camera opened: {}", self.events.opened);
        println!("   Camera closed: {}", self.events.closed);
        println!("   Preview size changes: {}", self.events.preview_changes);
        println!("   Errors: {}", self.events.errors);
        if let Some(error) = &self.last_error {
            println!("   Last error: {error}");
        }

        if !self.sizes.is_empty() {
            println!("\nNegotiated sizes (view frame)");
            for report in &self.sizes {
                println!(
                    "   {:<14} {:<5} {:<7} capture={} preview={} snapshot={}",
                    report.label,
                    report.facing,
                    report.mode,
                    show(report.capture),
                    show(report.preview),
                    show(report.snapshot),
                );
            }
        }

        println!("\n{}", self.lifecycle.summary());
    }
}

fn show(size: Option<Size>) -> String {
    size.map_or_else(|| "-".to_string(), |size| size.to_string())
}
