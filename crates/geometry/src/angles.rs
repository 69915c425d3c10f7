//! Rotation offsets between the sensor, view and output frames.
//!
//! All offsets are computed with the sensor frame as pivot. Front and back
//! cameras use different sign conventions because front sensors are mirrored
//! relative to the display.

use contracts::{Facing, Reference};

use crate::error::{AngleError, Result};

/// Orientation state of one session.
///
/// Setters accept multiples of 90 and store them normalized to `[0, 360)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Angles {
    facing: Facing,
    sensor_offset: u32,
    display_offset: u32,
    device_orientation: u32,
}

impl Angles {
    pub fn new(facing: Facing) -> Self {
        Self {
            facing,
            sensor_offset: 0,
            display_offset: 0,
            device_orientation: 0,
        }
    }

    /// All inputs at once.
    pub fn with(
        facing: Facing,
        sensor_offset: u32,
        display_offset: u32,
        device_orientation: u32,
    ) -> Result<Self> {
        let mut angles = Self::new(facing);
        angles.set_sensor_offset(facing, sensor_offset)?;
        angles.set_display_offset(display_offset)?;
        angles.set_device_orientation(device_orientation)?;
        Ok(angles)
    }

    /// Sensor mounting angle, reported by the opened camera of `facing`.
    pub fn set_sensor_offset(&mut self, facing: Facing, offset: u32) -> Result<()> {
        self.sensor_offset = sanitize("sensor_offset", offset)?;
        self.facing = facing;
        Ok(())
    }

    pub fn set_display_offset(&mut self, offset: u32) -> Result<()> {
        self.display_offset = sanitize("display_offset", offset)?;
        Ok(())
    }

    pub fn set_device_orientation(&mut self, orientation: u32) -> Result<()> {
        self.device_orientation = sanitize("device_orientation", orientation)?;
        Ok(())
    }

    pub fn facing(&self) -> Facing {
        self.facing
    }

    pub fn sensor_offset(&self) -> u32 {
        self.sensor_offset
    }

    pub fn display_offset(&self) -> u32 {
        self.display_offset
    }

    pub fn device_orientation(&self) -> u32 {
        self.device_orientation
    }

    /// Clockwise rotation taking frame `from` to frame `to`, in degrees.
    pub fn offset(&self, from: Reference, to: Reference) -> u32 {
        if from == to {
            return 0;
        }
        match (from, to) {
            (Reference::Sensor, to) => self.from_sensor(to),
            (from, Reference::Sensor) => (360 - self.from_sensor(from)) % 360,
            (from, to) => (self.from_sensor(to) + 360 - self.from_sensor(from)) % 360,
        }
    }

    /// Whether width and height swap between `from` and `to`.
    pub fn flip(&self, from: Reference, to: Reference) -> bool {
        self.offset(from, to) % 180 != 0
    }

    fn from_sensor(&self, to: Reference) -> u32 {
        let s = self.sensor_offset;
        match (to, self.facing) {
            (Reference::Sensor, _) => 0,
            (Reference::View, Facing::Front) => (360 - (s + self.display_offset) % 360) % 360,
            (Reference::View, Facing::Back) => (s + 360 - self.display_offset) % 360,
            (Reference::Output, Facing::Front) => (s + 360 - self.device_orientation) % 360,
            (Reference::Output, Facing::Back) => (s + self.device_orientation) % 360,
        }
    }
}

fn sanitize(field: &'static str, value: u32) -> Result<u32> {
    if value % 90 != 0 {
        return Err(AngleError::Unsanitized { field, value });
    }
    Ok(value % 360)
}

/// Quantize a raw orientation sensor reading to the nearest of
/// 0/90/180/270 using 45 degree sectors.
pub fn quantize_orientation(degrees: u32) -> u32 {
    match degrees % 360 {
        d if d >= 315 || d < 45 => 0,
        d if d < 135 => 90,
        d if d < 225 => 180,
        _ => 270,
    }
}
