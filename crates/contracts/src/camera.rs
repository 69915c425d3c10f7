//! Camera identity and capability types shared by the engine and its
//! hardware collaborators.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::{AspectRatio, ContractError, Size};

/// Physical direction a camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Facing {
    Front,
    #[default]
    Back,
}

impl Facing {
    pub fn opposite(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Capture mode. Picks which capture size list and selector are in play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Picture,
    Video,
}

/// Coordinate frames a size or rotation can be expressed in.
///
/// - `Sensor`: native orientation of the hardware sensor
/// - `View`: on-screen display orientation
/// - `Output`: orientation of the delivered frame or file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    Sensor,
    View,
    Output,
}

impl Reference {
    pub const ALL: [Reference; 3] = [Reference::Sensor, Reference::View, Reference::Output];
}

macro_rules! display_from_str {
    ($ty:ty { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let name = match self {
                    $(Self::$variant => $name,)+
                };
                f.pad(name)
            }
        }

        impl FromStr for $ty {
            type Err = ContractError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok(Self::$variant),)+
                    other => Err(ContractError::config_parse(format!(
                        "unknown {} '{}'",
                        stringify!($ty).to_ascii_lowercase(),
                        other
                    ))),
                }
            }
        }
    };
}

display_from_str!(Facing { Front => "front", Back => "back" });
display_from_str!(Mode { Picture => "picture", Video => "video" });
display_from_str!(Reference { Sensor => "sensor", View => "view", Output => "output" });

/// What an opened camera reports about itself.
///
/// All sizes are in the `Sensor` frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Capabilities {
    /// Mounting angle of the sensor relative to the device's natural
    /// orientation, one of 0/90/180/270.
    pub sensor_offset: u32,

    /// Facings available on this device.
    pub supported_facings: Vec<Facing>,

    pub picture_sizes: Vec<Size>,

    pub video_sizes: Vec<Size>,

    #[serde(default)]
    pub zoom_supported: bool,

    #[serde(default)]
    pub auto_focus_supported: bool,

    /// Exposure correction range in EV, if supported.
    #[serde(default)]
    pub exposure_correction: Option<(f32, f32)>,
}

impl Capabilities {
    pub fn supports_facing(&self, facing: Facing) -> bool {
        self.supported_facings.contains(&facing)
    }

    /// Candidate capture sizes for the given mode.
    pub fn capture_sizes(&self, mode: Mode) -> &[Size] {
        match mode {
            Mode::Picture => &self.picture_sizes,
            Mode::Video => &self.video_sizes,
        }
    }

    /// Distinct aspect ratios among the capture sizes of `mode`.
    pub fn aspect_ratios(&self, mode: Mode) -> BTreeSet<AspectRatio> {
        self.capture_sizes(mode)
            .iter()
            .filter_map(|size| size.aspect_ratio())
            .collect()
    }
}
