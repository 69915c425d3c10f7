//! Session driver - runs a scripted session on the mock device.
//!
//! Script: surface, open, optional resize, optional facing switch, optional
//! simulated disconnect, close, destroy. Engine failures are recorded, not
//! fatal; the listener reports what the engine could not recover.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use contracts::{CameraError, Reference, SessionBlueprint, Size};
use engine::{CameraEngine, EngineEvent, EngineOptions, MockSession, StepTask};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

use super::{SessionStats, SizeReport};

/// Driver configuration
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Validated session blueprint
    pub blueprint: SessionBlueprint,

    /// Surface size to switch to once preview runs
    pub resize: Option<Size>,

    /// Switch to the opposite camera once preview runs
    pub switch_facing: bool,

    /// Report a transient disconnect once preview runs
    pub disconnect: bool,
}

/// Drives one scripted session against a [`MockSession`]
pub struct SessionDriver {
    config: DriverConfig,
}

impl SessionDriver {
    pub fn new(config: DriverConfig) -> Self {
        Self { config }
    }

    /// Run the script and collect statistics
    #[instrument(name = "session_run", skip(self), fields(facing = %self.config.blueprint.camera.facing))]
    pub async fn run(&self) -> Result<SessionStats> {
        let blueprint = &self.config.blueprint;
        let started = Instant::now();
        let mut stats = SessionStats::default();

        let (tx, mut events) = mpsc::unbounded_channel();
        let engine = CameraEngine::new(
            MockSession::from_profile(blueprint.device.clone()),
            Arc::new(tx),
            EngineOptions::from_blueprint(blueprint),
        )
        .context("Failed to create camera engine")?;

        if let Some(surface) = blueprint.surface {
            step(&mut stats, "surface", engine.on_surface_available(surface)).await;
        }
        step(&mut stats, "open", engine.open()).await;
        report(&engine, &mut events, &mut stats, "opened");

        if let Some(size) = self.config.resize {
            info!(%size, "Resizing surface");
            step(&mut stats, "resize", engine.on_surface_changed(size)).await;
            report(&engine, &mut events, &mut stats, "resized");
        }

        if self.config.switch_facing {
            let facing = engine.facing().opposite();
            info!(%facing, "Switching camera");
            step(&mut stats, "switch_facing", engine.set_facing(facing)).await;
            report(&engine, &mut events, &mut stats, "switched");
        }

        if self.config.disconnect {
            simulate_disconnect(&engine, &mut events, &mut stats).await;
            report(&engine, &mut events, &mut stats, "reconnected");
        }

        step(&mut stats, "close", engine.close()).await;
        engine.destroy().await;
        drain(&mut events, &mut stats);

        stats.duration = started.elapsed();
        info!(
            duration_ms = stats.duration.as_millis() as u64,
            errors = stats.events.errors,
            "Session finished"
        );
        Ok(stats)
    }
}

/// Await one engine operation, recording its latency and outcome.
async fn step(stats: &mut SessionStats, operation: &str, task: StepTask) {
    let started = Instant::now();
    let result = task.await;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    stats.lifecycle.record(operation, latency_ms, result.is_ok());
    if let Err(error) = result {
        warn!(operation, %error, "Engine operation failed");
    }
}

fn drain(events: &mut mpsc::UnboundedReceiver<EngineEvent>, stats: &mut SessionStats) {
    while let Ok(event) = events.try_recv() {
        stats.record_event(&event);
    }
}

/// Snapshot the negotiated sizes in the view frame.
fn report(
    engine: &CameraEngine<MockSession>,
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    stats: &mut SessionStats,
    label: &str,
) {
    drain(events, stats);
    stats.sizes.push(SizeReport {
        label: label.to_string(),
        facing: engine.facing(),
        mode: engine.mode(),
        capture: engine.capture_size(Reference::View),
        preview: engine.preview_stream_size(Reference::View),
        snapshot: engine.uncropped_snapshot_size(Reference::View),
    });
}

/// Report a transient disconnect and wait until the engine handled it.
async fn simulate_disconnect(
    engine: &CameraEngine<MockSession>,
    events: &mut mpsc::UnboundedReceiver<EngineEvent>,
    stats: &mut SessionStats,
) {
    drain(events, stats);
    let opened_before = stats.events.opened;
    warn!("Simulating device disconnect");
    engine.report_error(CameraError::disconnected("simulated disconnect"));

    // error handling is queued ahead of the flush
    step(stats, "recover", engine.flush()).await;
    drain(events, stats);

    if stats.events.opened > opened_before {
        stats.lifecycle.record_auto_restart();
        info!("Engine recovered from disconnect");
    } else {
        warn!(error = ?stats.last_error.as_ref().map(ToString::to_string), "Engine did not recover from disconnect");
    }
}
