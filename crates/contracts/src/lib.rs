//! # Contracts
//!
//! Frozen interface contracts shared by every crate of the workspace:
//! size value types, camera identity/capabilities, the tagged camera error
//! and the session config schema.
//! Business crates depend on this crate, never the other way round.
//!
//! ## Frames
//! - Hardware reported sizes are in the `Sensor` frame
//! - Surface sizes and user constraints are in the `View` frame

mod blueprint;
mod camera;
mod error;
mod size;

pub use blueprint::*;
pub use camera::*;
pub use error::*;
pub use size::*;
