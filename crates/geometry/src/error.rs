//! Geometry error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AngleError {
    /// Orientation inputs must be multiples of 90 degrees
    #[error("{field} must be a multiple of 90 degrees, got {value}")]
    Unsanitized { field: &'static str, value: u32 },
}

pub type Result<T> = std::result::Result<T, AngleError>;
