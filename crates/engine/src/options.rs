//! Runtime engine options

use std::time::Duration;

use contracts::{Facing, Mode, SessionBlueprint, SnapshotConfig};
use sizing::SizeSelector;

/// Options fixed at engine construction
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Engine thread name
    pub name: String,
    pub facing: Facing,
    pub mode: Mode,
    /// Degrees, multiple of 90
    pub display_offset: u32,
    /// Degrees, multiple of 90
    pub device_orientation: u32,
    pub picture_selector: SizeSelector,
    pub video_selector: SizeSelector,
    /// Tried before the built-in preview policy
    pub preview_selector: Option<SizeSelector>,
    pub snapshot: Option<SnapshotConfig>,
    /// Upper bound on how long `destroy` waits for the queued stop
    pub destroy_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            name: "camera-engine".to_string(),
            facing: Facing::Back,
            mode: Mode::Picture,
            display_offset: 0,
            device_orientation: 0,
            picture_selector: sizing::biggest(),
            video_selector: sizing::biggest(),
            preview_selector: None,
            snapshot: None,
            destroy_timeout: Duration::from_secs(6),
        }
    }
}

impl EngineOptions {
    /// Options described by a (validated) blueprint
    pub fn from_blueprint(blueprint: &SessionBlueprint) -> Self {
        Self {
            facing: blueprint.camera.facing,
            mode: blueprint.camera.mode,
            display_offset: blueprint.camera.display_offset,
            device_orientation: blueprint.camera.device_orientation,
            picture_selector: sizing::parse_constraints(&blueprint.sizes.picture),
            video_selector: sizing::parse_constraints(&blueprint.sizes.video),
            preview_selector: sizing::parse_optional(blueprint.sizes.preview.as_ref()),
            snapshot: blueprint.snapshot,
            ..Self::default()
        }
    }
}
