//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{Reference, SessionBlueprint};
use geometry::Angles;
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    facing: String,
    mode: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    surface: Option<String>,
    camera_count: usize,
    latency_ms: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

impl ValidationResult {
    fn invalid(config_path: String, error: String) -> Self {
        Self {
            valid: false,
            config_path,
            error: Some(error),
            warnings: None,
            summary: None,
        }
    }

    fn valid(config_path: String, blueprint: &SessionBlueprint) -> Self {
        let warnings = collect_warnings(blueprint);
        Self {
            valid: true,
            config_path,
            error: None,
            warnings: (!warnings.is_empty()).then_some(warnings),
            summary: Some(ConfigSummary {
                version: format!("{:?}", blueprint.version),
                facing: blueprint.camera.facing.to_string(),
                mode: blueprint.camera.mode.to_string(),
                surface: blueprint.surface.map(|s| s.to_string()),
                camera_count: blueprint.device.cameras.len(),
                latency_ms: blueprint.device.latency_ms,
            }),
        }
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();
    if !args.config.exists() {
        let error = format!("File not found: {config_path}");
        return ValidationResult::invalid(config_path, error);
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(blueprint) => ValidationResult::valid(config_path, &blueprint),
        Err(e) => ValidationResult::invalid(config_path, e.to_string()),
    }
}

/// Non-fatal issues: the config works but probably not as intended
fn collect_warnings(blueprint: &SessionBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.surface.is_none() {
        warnings.push("No surface configured - only the ENGINE stage will open".to_string());
    }

    let sections = [
        ("picture", &blueprint.sizes.picture),
        ("video", &blueprint.sizes.video),
    ];
    for camera in &blueprint.device.cameras {
        let Ok(angles) = Angles::with(
            camera.facing,
            camera.sensor_offset,
            blueprint.camera.display_offset,
            blueprint.camera.device_orientation,
        ) else {
            continue;
        };
        let flip = angles.flip(Reference::Sensor, Reference::View);

        for (name, constraints) in sections {
            if constraints.is_unconstrained() {
                continue;
            }
            let candidates = match name {
                "picture" => &camera.picture_sizes,
                _ => &camera.video_sizes,
            };
            let view: Vec<_> = candidates.iter().map(|s| s.flip_if(flip)).collect();
            let selector = sizing::parse_constraints(constraints);
            if selector.select(&view).is_empty() {
                warnings.push(format!(
                    "sizes.{name} ({selector}) matches no {name} size of the {} camera - biggest will be used",
                    camera.facing
                ));
            }
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Facing: {}", summary.facing);
            println!("  Mode: {}", summary.mode);
            println!(
                "  Surface: {}",
                summary.surface.as_deref().unwrap_or("(none)")
            );
            println!("  Cameras: {}", summary.camera_count);
            println!("  Simulated latency: {}ms", summary.latency_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
