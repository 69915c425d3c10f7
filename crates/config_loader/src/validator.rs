//! Config validation
//!
//! Rules:
//! - orientation angles are multiples of 90 below 360
//! - surface, when present, is non-empty
//! - min <= max for every constraint pair, `smallest` and `biggest` exclusive
//! - aspect tolerance finite and >= 0
//! - snapshot bounds non-zero
//! - camera facings unique, size lists non-empty with non-zero sizes
//! - the requested facing exists on the device

use std::collections::HashSet;

use contracts::{CameraProfile, ContractError, SessionBlueprint, Size, SizeConstraints};

/// Validate a SessionBlueprint
///
/// Returns the first error encountered.
pub fn validate(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_camera(blueprint)?;
    validate_surface(blueprint)?;
    validate_constraints("sizes.picture", &blueprint.sizes.picture)?;
    validate_constraints("sizes.video", &blueprint.sizes.video)?;
    if let Some(preview) = &blueprint.sizes.preview {
        validate_constraints("sizes.preview", preview)?;
    }
    validate_snapshot(blueprint)?;
    validate_device(blueprint)?;
    Ok(())
}

fn validate_angle(field: &str, value: u32) -> Result<(), ContractError> {
    if value % 90 != 0 || value >= 360 {
        return Err(ContractError::config_validation(
            field,
            format!("must be one of 0, 90, 180, 270, got {value}"),
        ));
    }
    Ok(())
}

fn validate_camera(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    validate_angle("camera.display_offset", blueprint.camera.display_offset)?;
    validate_angle("camera.device_orientation", blueprint.camera.device_orientation)
}

fn validate_surface(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    match blueprint.surface {
        Some(surface) if surface.is_empty() => Err(ContractError::config_validation(
            "surface",
            format!("surface must be non-empty, got {surface}"),
        )),
        _ => Ok(()),
    }
}

fn check_range<T: PartialOrd + std::fmt::Display>(
    field: String,
    min: Option<T>,
    max: Option<T>,
) -> Result<(), ContractError> {
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(ContractError::config_validation(
                field,
                format!("min ({min}) must be <= max ({max})"),
            ));
        }
    }
    Ok(())
}

fn validate_constraints(section: &str, c: &SizeConstraints) -> Result<(), ContractError> {
    check_range(format!("{section}.min_width / max_width"), c.min_width, c.max_width)?;
    check_range(format!("{section}.min_height / max_height"), c.min_height, c.max_height)?;
    check_range(format!("{section}.min_area / max_area"), c.min_area, c.max_area)?;

    if let Some(tolerance) = c.aspect_tolerance {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(ContractError::config_validation(
                format!("{section}.aspect_tolerance"),
                format!("aspect_tolerance must be finite and >= 0, got {tolerance}"),
            ));
        }
    }

    if c.smallest && c.biggest {
        return Err(ContractError::config_validation(
            format!("{section}.smallest / biggest"),
            "smallest and biggest are mutually exclusive",
        ));
    }
    Ok(())
}

fn validate_snapshot(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let Some(snapshot) = blueprint.snapshot else {
        return Ok(());
    };
    for (field, value) in [
        ("snapshot.max_width", snapshot.max_width),
        ("snapshot.max_height", snapshot.max_height),
    ] {
        if value == Some(0) {
            return Err(ContractError::config_validation(
                field,
                "bound must be > 0, omit it for unbounded",
            ));
        }
    }
    Ok(())
}

fn validate_sizes(field: String, sizes: &[Size]) -> Result<(), ContractError> {
    if sizes.is_empty() {
        return Err(ContractError::config_validation(field, "size list cannot be empty"));
    }
    if let Some(size) = sizes.iter().find(|size| size.is_empty()) {
        return Err(ContractError::config_validation(
            field,
            format!("sizes must be non-zero, got {size}"),
        ));
    }
    Ok(())
}

fn validate_camera_profile(camera: &CameraProfile) -> Result<(), ContractError> {
    let prefix = format!("device.cameras[facing={}]", camera.facing);
    validate_angle(&format!("{prefix}.sensor_offset"), camera.sensor_offset)?;
    validate_sizes(format!("{prefix}.picture_sizes"), &camera.picture_sizes)?;
    validate_sizes(format!("{prefix}.video_sizes"), &camera.video_sizes)?;
    validate_sizes(format!("{prefix}.preview_sizes"), &camera.preview_sizes)?;

    if let Some((min, max)) = camera.exposure_correction {
        if min > max {
            return Err(ContractError::config_validation(
                format!("{prefix}.exposure_correction"),
                format!("range ({min}, {max}) is inverted"),
            ));
        }
    }
    Ok(())
}

fn validate_device(blueprint: &SessionBlueprint) -> Result<(), ContractError> {
    let device = &blueprint.device;
    if device.cameras.is_empty() {
        return Err(ContractError::config_validation(
            "device.cameras",
            "device profile has no cameras",
        ));
    }

    let mut seen = HashSet::new();
    for camera in &device.cameras {
        if !seen.insert(camera.facing) {
            return Err(ContractError::config_validation(
                format!("device.cameras[facing={}]", camera.facing),
                "duplicate camera facing",
            ));
        }
        validate_camera_profile(camera)?;
    }

    if device.camera(blueprint.camera.facing).is_none() {
        return Err(ContractError::config_validation(
            "camera.facing",
            format!(
                "requested facing '{}' not found in device cameras",
                blueprint.camera.facing
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Facing, SnapshotConfig};

    fn valid_blueprint() -> SessionBlueprint {
        SessionBlueprint {
            surface: Some(Size::new(1080, 1920)),
            ..Default::default()
        }
    }

    fn field_of(err: ContractError) -> String {
        match err {
            ContractError::ConfigValidation { field, .. } => field,
            other => panic!("expected validation error, got {other}"),
        }
    }

    #[test]
    fn test_valid_default_config() {
        assert!(validate(&valid_blueprint()).is_ok());
        assert!(validate(&SessionBlueprint::default()).is_ok());
    }

    #[test]
    fn test_unsanitized_angles() {
        let mut bp = valid_blueprint();
        bp.camera.display_offset = 45;
        assert_eq!(field_of(validate(&bp).unwrap_err()), "camera.display_offset");

        let mut bp = valid_blueprint();
        bp.camera.device_orientation = 360;
        assert_eq!(field_of(validate(&bp).unwrap_err()), "camera.device_orientation");

        let mut bp = valid_blueprint();
        bp.device.cameras[0].sensor_offset = 100;
        assert!(field_of(validate(&bp).unwrap_err()).ends_with("sensor_offset"));
    }

    #[test]
    fn test_empty_surface() {
        let mut bp = valid_blueprint();
        bp.surface = Some(Size::new(0, 1920));
        assert_eq!(field_of(validate(&bp).unwrap_err()), "surface");
    }

    #[test]
    fn test_inverted_ranges() {
        let mut bp = valid_blueprint();
        bp.sizes.picture.min_width = Some(2000);
        bp.sizes.picture.max_width = Some(1000);
        assert_eq!(
            field_of(validate(&bp).unwrap_err()),
            "sizes.picture.min_width / max_width"
        );

        let mut bp = valid_blueprint();
        bp.sizes.preview = Some(SizeConstraints {
            min_area: Some(10),
            max_area: Some(5),
            ..Default::default()
        });
        assert_eq!(
            field_of(validate(&bp).unwrap_err()),
            "sizes.preview.min_area / max_area"
        );
    }

    #[test]
    fn test_bad_tolerance_and_exclusive_orders() {
        let mut bp = valid_blueprint();
        bp.sizes.video.aspect_tolerance = Some(-0.1);
        assert_eq!(field_of(validate(&bp).unwrap_err()), "sizes.video.aspect_tolerance");

        let mut bp = valid_blueprint();
        bp.sizes.video.aspect_tolerance = Some(f32::NAN);
        assert!(validate(&bp).is_err());

        let mut bp = valid_blueprint();
        bp.sizes.picture.smallest = true;
        bp.sizes.picture.biggest = true;
        assert!(validate(&bp)
            .unwrap_err()
            .to_string()
            .contains("mutually exclusive"));
    }

    #[test]
    fn test_zero_snapshot_bound() {
        let mut bp = valid_blueprint();
        bp.snapshot = Some(SnapshotConfig {
            max_width: Some(0),
            max_height: None,
        });
        assert_eq!(field_of(validate(&bp).unwrap_err()), "snapshot.max_width");
    }

    #[test]
    fn test_device_rules() {
        let mut bp = valid_blueprint();
        let back = bp.device.cameras[0].clone();
        bp.device.cameras.push(back);
        assert!(validate(&bp).unwrap_err().to_string().contains("duplicate"));

        let mut bp = valid_blueprint();
        bp.device.cameras[1].preview_sizes.clear();
        assert!(field_of(validate(&bp).unwrap_err()).ends_with("preview_sizes"));

        let mut bp = valid_blueprint();
        bp.device.cameras[0].picture_sizes.push(Size::new(0, 0));
        assert!(field_of(validate(&bp).unwrap_err()).ends_with("picture_sizes"));

        let mut bp = valid_blueprint();
        bp.device.cameras.clear();
        assert_eq!(field_of(validate(&bp).unwrap_err()), "device.cameras");
    }

    #[test]
    fn test_requested_facing_missing() {
        let mut bp = valid_blueprint();
        bp.device.cameras.retain(|camera| camera.facing == Facing::Back);
        bp.camera.facing = Facing::Front;
        assert_eq!(field_of(validate(&bp).unwrap_err()), "camera.facing");
    }
}
