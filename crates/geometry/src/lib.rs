//! # Geometry
//!
//! Reference frame math and frame-aware size negotiation.
//!
//! - [`Angles`]: rotation offsets between sensor, view and output frames
//! - [`resolve`]: capture and preview stream size policies

pub mod angles;
pub mod error;
pub mod resolve;

pub use angles::{quantize_orientation, Angles};
pub use error::{AngleError, Result};
pub use resolve::{compute_capture_size, compute_preview_stream_size, uncropped_snapshot_size};
