//! SessionBlueprint - Config Loader output
//!
//! Describes one camera session: requested facing/mode, orientation inputs,
//! the delivery surface, size constraints and the simulated device profile.

use serde::{Deserialize, Serialize};

use crate::{AspectRatio, Capabilities, Facing, Mode, Size};

/// Config version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete session configuration blueprint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionBlueprint {
    /// Config version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Delivery surface size in the view frame. Without it only the
    /// engine stage is opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surface: Option<Size>,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub sizes: SizesConfig,

    /// Bounds for uncropped snapshots, view frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotConfig>,

    #[serde(default)]
    pub device: DeviceProfile,
}

/// Requested camera and orientation inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraConfig {
    #[serde(default)]
    pub facing: Facing,

    #[serde(default)]
    pub mode: Mode,

    /// Display rotation relative to the natural device orientation (degrees)
    #[serde(default)]
    pub display_offset: u32,

    /// Device orientation from the orientation sensor (degrees)
    #[serde(default)]
    pub device_orientation: u32,
}

/// Size constraints per stream
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizesConfig {
    #[serde(default)]
    pub picture: SizeConstraints,

    #[serde(default)]
    pub video: SizeConstraints,

    /// Absent means the engine's built-in preview policy alone decides.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<SizeConstraints>,
}

/// Declarative size constraints, all optional.
///
/// Bounds are inclusive and expressed in the view frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SizeConstraints {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_area: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_area: Option<u64>,

    /// e.g. "16:9"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_ratio: Option<AspectRatio>,

    /// Absolute tolerance on `width / height`, default 0
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aspect_tolerance: Option<f32>,

    #[serde(default)]
    pub smallest: bool,

    #[serde(default)]
    pub biggest: bool,
}

impl SizeConstraints {
    /// True when no constraint at all is set.
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }
}

/// Snapshot bounds (view frame). Missing or zero means unbounded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

/// Simulated hardware, consumed by the mock session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfile {
    /// Simulated latency of every session operation
    #[serde(default)]
    pub latency_ms: u64,

    #[serde(default)]
    pub cameras: Vec<CameraProfile>,
}

/// One physical camera of a simulated device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraProfile {
    pub facing: Facing,

    /// Mounting angle of the sensor (degrees)
    pub sensor_offset: u32,

    /// Sensor frame
    pub picture_sizes: Vec<Size>,

    /// Sensor frame
    pub video_sizes: Vec<Size>,

    /// Sensor frame
    pub preview_sizes: Vec<Size>,

    #[serde(default)]
    pub zoom_supported: bool,

    #[serde(default)]
    pub auto_focus_supported: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_correction: Option<(f32, f32)>,
}

impl DeviceProfile {
    pub fn camera(&self, facing: Facing) -> Option<&CameraProfile> {
        self.cameras.iter().find(|camera| camera.facing == facing)
    }

    pub fn facings(&self) -> Vec<Facing> {
        self.cameras.iter().map(|camera| camera.facing).collect()
    }

    /// Capabilities reported when the camera for `facing` is opened.
    pub fn capabilities(&self, facing: Facing) -> Option<Capabilities> {
        let camera = self.camera(facing)?;
        Some(Capabilities {
            sensor_offset: camera.sensor_offset,
            supported_facings: self.facings(),
            picture_sizes: camera.picture_sizes.clone(),
            video_sizes: camera.video_sizes.clone(),
            zoom_supported: camera.zoom_supported,
            auto_focus_supported: camera.auto_focus_supported,
            exposure_correction: camera.exposure_correction,
        })
    }
}

/// A typical phone: landscape back sensor mounted at 90, front at 270.
impl Default for DeviceProfile {
    fn default() -> Self {
        let sizes = |list: &[(u32, u32)]| list.iter().copied().map(Size::from).collect::<Vec<_>>();
        Self {
            latency_ms: 0,
            cameras: vec![
                CameraProfile {
                    facing: Facing::Back,
                    sensor_offset: 90,
                    picture_sizes: sizes(&[(4000, 3000), (3840, 2160), (1920, 1080), (640, 480)]),
                    video_sizes: sizes(&[(3840, 2160), (1920, 1080), (1280, 720)]),
                    preview_sizes: sizes(&[(1920, 1080), (1440, 1080), (1280, 720), (960, 540), (640, 480)]),
                    zoom_supported: true,
                    auto_focus_supported: true,
                    exposure_correction: Some((-2.0, 2.0)),
                },
                CameraProfile {
                    facing: Facing::Front,
                    sensor_offset: 270,
                    picture_sizes: sizes(&[(3264, 2448), (1920, 1080), (640, 480)]),
                    video_sizes: sizes(&[(1920, 1080), (1280, 720)]),
                    preview_sizes: sizes(&[(1920, 1080), (1280, 720), (640, 480)]),
                    zoom_supported: false,
                    auto_focus_supported: false,
                    exposure_correction: None,
                },
            ],
        }
    }
}
