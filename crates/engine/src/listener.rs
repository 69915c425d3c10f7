//! Engine callbacks to the owning component.

use contracts::{CameraError, Capabilities, Size};
use tokio::sync::mpsc;

/// Lifecycle callbacks, invoked on the engine thread.
pub trait EngineListener: Send + Sync + 'static {
    fn on_camera_opened(&self, capabilities: &Capabilities);

    fn on_camera_closed(&self);

    /// A camera error that was not recovered automatically.
    fn on_error(&self, error: &CameraError);

    /// The preview stream was re-negotiated, `size` in the sensor frame.
    fn on_preview_stream_size_changed(&self, _size: Size) {}
}

/// Callbacks as values, see the `mpsc` listener impl.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CameraOpened(Capabilities),
    CameraClosed,
    Error(CameraError),
    PreviewStreamSizeChanged(Size),
}

/// Forwards every callback as an [`EngineEvent`]. A closed receiver is ignored.
impl EngineListener for mpsc::UnboundedSender<EngineEvent> {
    fn on_camera_opened(&self, capabilities: &Capabilities) {
        let _ = self.send(EngineEvent::CameraOpened(capabilities.clone()));
    }

    fn on_camera_closed(&self) {
        let _ = self.send(EngineEvent::CameraClosed);
    }

    fn on_error(&self, error: &CameraError) {
        let _ = self.send(EngineEvent::Error(error.clone()));
    }

    fn on_preview_stream_size_changed(&self, size: Size) {
        let _ = self.send(EngineEvent::PreviewStreamSizeChanged(size));
    }
}

/// Ignores everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopListener;

impl EngineListener for NoopListener {
    fn on_camera_opened(&self, _capabilities: &Capabilities) {}

    fn on_camera_closed(&self) {}

    fn on_error(&self, _error: &CameraError) {}
}
