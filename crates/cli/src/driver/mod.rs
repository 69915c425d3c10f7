//! Scripted session driving.

mod scenario;
mod stats;

pub use scenario::{DriverConfig, SessionDriver};
pub use stats::{SessionStats, SizeReport};
