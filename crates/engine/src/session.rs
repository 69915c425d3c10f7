//! Hardware session abstraction
//!
//! The engine drives a concrete camera through this trait. Real bindings and
//! the in-process mock implement it.

use std::future::Future;

use contracts::{CameraError, Capabilities, Facing, Mode, Size};

/// Result of a collaborator call
pub type SessionResult<T> = std::result::Result<T, CameraError>;

/// Camera hardware session
///
/// All calls are issued from the engine thread, at most one per stage at a
/// time. Sizes are in the sensor frame.
pub trait CameraSession: Send + Sync + 'static {
    /// Open the device for `facing` and report what it supports
    fn on_start_engine(
        &self,
        facing: Facing,
        mode: Mode,
    ) -> impl Future<Output = SessionResult<Capabilities>> + Send;

    /// Attach the delivery surface. `capture_size` is already resolved.
    fn on_start_bind(&self, capture_size: Size) -> impl Future<Output = SessionResult<()>> + Send;

    /// Start streaming at `preview_size`
    fn on_start_preview(&self, preview_size: Size)
        -> impl Future<Output = SessionResult<()>> + Send;

    /// Stop streaming. Must succeed when nothing is streaming.
    fn on_stop_preview(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Detach the surface. Must succeed when nothing is bound.
    fn on_stop_bind(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Close the device. Must succeed when nothing is open.
    fn on_stop_engine(&self) -> impl Future<Output = SessionResult<()>> + Send;

    /// Stream sizes of the open device. Only called while the engine stage
    /// is started.
    fn preview_stream_available_sizes(&self) -> Vec<Size>;
}
