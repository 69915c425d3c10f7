//! Command implementations.

mod info;
mod run;
mod validate;

pub use info::run_info;
pub use run::run_session;
pub use validate::run_validate;

use anyhow::{Context, Result};
use contracts::SessionBlueprint;
use std::path::Path;
use tracing::info;

use crate::cli::Overrides;
use crate::error::CliError;

/// Load the blueprint at `path`, or the built-in default, then apply CLI
/// overrides and validate the result.
pub(crate) fn load_blueprint(path: Option<&Path>, overrides: &Overrides) -> Result<SessionBlueprint> {
    let mut blueprint = match path {
        Some(path) => {
            if !path.exists() {
                return Err(CliError::config_not_found(path).into());
            }
            info!(config = %path.display(), "Loading configuration");
            config_loader::ConfigLoader::load_from_path(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?
        }
        None => {
            info!("No configuration given, using the built-in device profile");
            SessionBlueprint::default()
        }
    };

    apply_overrides(&mut blueprint, overrides);
    config_loader::ConfigLoader::validate(&blueprint)
        .map_err(|e| CliError::config_validation(e.to_string()))?;
    Ok(blueprint)
}

fn apply_overrides(blueprint: &mut SessionBlueprint, overrides: &Overrides) {
    if let Some(facing) = overrides.facing {
        info!(facing = %facing, "Overriding facing from CLI");
        blueprint.camera.facing = facing;
    }
    if let Some(mode) = overrides.mode {
        info!(mode = %mode, "Overriding mode from CLI");
        blueprint.camera.mode = mode;
    }
    if let Some(surface) = overrides.surface {
        info!(surface = %surface, "Overriding surface from CLI");
        blueprint.surface = Some(surface);
    }
}
