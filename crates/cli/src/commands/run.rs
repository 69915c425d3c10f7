//! `run` command implementation.

use anyhow::{Context, Result};
use std::time::Duration;
use tracing::{info, warn};

use super::load_blueprint;
use crate::cli::RunArgs;
use crate::driver::{DriverConfig, SessionDriver};
use crate::error::CliError;

/// Execute the `run` command
pub async fn run_session(args: &RunArgs) -> Result<()> {
    let blueprint = load_blueprint(args.config.as_deref(), &args.overrides)?;

    info!(
        facing = %blueprint.camera.facing,
        mode = %blueprint.camera.mode,
        cameras = blueprint.device.cameras.len(),
        latency_ms = blueprint.device.latency_ms,
        "Configuration loaded"
    );

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let driver = SessionDriver::new(DriverConfig {
        blueprint,
        resize: args.resize,
        switch_facing: args.switch_facing,
        disconnect: args.disconnect,
    });

    let timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    let run = async {
        match timeout {
            Some(limit) => match tokio::time::timeout(limit, driver.run()).await {
                Ok(result) => result,
                Err(_) => Err(CliError::Timeout { secs: args.timeout }.into()),
            },
            None => driver.run().await,
        }
    };

    tokio::select! {
        result = run => {
            let stats = result.context("Session execution failed")?;
            if args.json {
                let json = serde_json::to_string_pretty(&stats.to_json())
                    .context("Failed to serialize session summary")?;
                println!("{json}");
            } else {
                stats.print_summary();
            }
            if let Some(error) = stats.last_error {
                return Err(CliError::session(error.to_string()).into());
            }
        }
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, abandoning session");
        }
    }

    info!("Camera session CLI finished");
    Ok(())
}

/// Ctrl+C and SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
