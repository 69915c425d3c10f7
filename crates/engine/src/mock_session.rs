//! Mock camera session
//!
//! In-process `CameraSession` backed by a `DeviceProfile`. Supports latency,
//! failure injection and call recording for tests and the CLI.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{CameraError, Capabilities, DeviceProfile, Facing, Mode, Size};
use tracing::{debug, instrument};

use crate::session::{CameraSession, SessionResult};

/// Session operations, for failure injection and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOperation {
    StartEngine,
    StartBind,
    StartPreview,
    StopPreview,
    StopBind,
    StopEngine,
}

/// One recorded call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockCall {
    pub operation: MockOperation,
    /// Requested size for bind / preview starts
    pub size: Option<Size>,
    /// Facing for engine starts
    pub facing: Option<Facing>,
}

/// Fail `operation` the next `remaining` times
#[derive(Debug, Clone)]
pub struct InjectedFailure {
    pub operation: MockOperation,
    pub error: CameraError,
    pub remaining: usize,
}

/// Mock session config
#[derive(Debug, Clone, Default)]
pub struct MockConfig {
    /// Delay applied to every async operation
    pub latency: Duration,
    /// Failures injected up front
    pub failures: Vec<InjectedFailure>,
}

#[derive(Debug, Default)]
struct Device {
    open: Option<Facing>,
    bound: Option<Size>,
    streaming: Option<Size>,
}

#[derive(Debug)]
struct Shared {
    profile: DeviceProfile,
    latency: Duration,
    failures: Mutex<Vec<InjectedFailure>>,
    calls: Mutex<Vec<MockCall>>,
    device: Mutex<Device>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

/// Mock camera session
#[derive(Debug, Clone)]
pub struct MockSession {
    shared: Arc<Shared>,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockSession {
    /// Mock session over `profile` with no latency or failures
    pub fn new(profile: DeviceProfile) -> Self {
        Self::with_config(profile, MockConfig::default())
    }

    /// Mock session with config
    pub fn with_config(profile: DeviceProfile, config: MockConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                profile,
                latency: config.latency,
                failures: Mutex::new(config.failures),
                calls: Mutex::new(Vec::new()),
                device: Mutex::new(Device::default()),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }),
        }
    }

    /// Latency from the profile's `latency_ms`
    pub fn from_profile(profile: DeviceProfile) -> Self {
        let latency = Duration::from_millis(profile.latency_ms);
        Self::with_config(
            profile,
            MockConfig {
                latency,
                failures: Vec::new(),
            },
        )
    }

    /// Fail the next call of `operation`
    pub fn fail_next(&self, operation: MockOperation, error: CameraError) {
        self.fail_times(operation, error, 1);
    }

    /// Fail the next `times` calls of `operation`
    pub fn fail_times(&self, operation: MockOperation, error: CameraError, times: usize) {
        self.lock_failures().push(InjectedFailure {
            operation,
            error,
            remaining: times,
        });
    }

    /// All calls so far
    pub fn calls(&self) -> Vec<MockCall> {
        self.shared.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Operations so far, in call order
    pub fn operations(&self) -> Vec<MockOperation> {
        self.calls().into_iter().map(|call| call.operation).collect()
    }

    pub fn clear_calls(&self) {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Highest number of concurrently running operations observed
    pub fn max_in_flight(&self) -> usize {
        self.shared.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn open_facing(&self) -> Option<Facing> {
        self.lock_device().open
    }

    pub fn bound_size(&self) -> Option<Size> {
        self.lock_device().bound
    }

    pub fn streaming_size(&self) -> Option<Size> {
        self.lock_device().streaming
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.shared.profile
    }

    fn lock_device(&self) -> std::sync::MutexGuard<'_, Device> {
        self.shared.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_failures(&self) -> std::sync::MutexGuard<'_, Vec<InjectedFailure>> {
        self.shared.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: MockOperation, size: Option<Size>, facing: Option<Facing>) {
        self.shared
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(MockCall {
                operation,
                size,
                facing,
            });
    }

    /// Count the call in flight, apply latency, then consume an injected
    /// failure if one is pending.
    async fn enter(&self, operation: MockOperation) -> SessionResult<()> {
        let now = self.shared.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = InFlight(&self.shared.in_flight);
        self.shared.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if self.shared.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.shared.latency).await;
        }

        let mut failures = self.lock_failures();
        if let Some(index) = failures
            .iter()
            .position(|f| f.operation == operation && f.remaining > 0)
        {
            let failure = &mut failures[index];
            failure.remaining -= 1;
            let error = failure.error.clone();
            if failure.remaining == 0 {
                failures.remove(index);
            }
            debug!(?operation, error = %error, "injected failure");
            return Err(error);
        }
        Ok(())
    }
}

impl CameraSession for MockSession {
    #[instrument(name = "mock_session_start_engine", skip(self), fields(facing = %facing, mode = %mode))]
    async fn on_start_engine(&self, facing: Facing, mode: Mode) -> SessionResult<Capabilities> {
        self.record(MockOperation::StartEngine, None, Some(facing));
        self.enter(MockOperation::StartEngine).await?;

        let capabilities = self
            .shared
            .profile
            .capabilities(facing)
            .ok_or_else(|| CameraError::no_camera(format!("no {facing} camera on this device")))?;
        let mut device = self.lock_device();
        if let Some(open) = device.open {
            return Err(CameraError::failed_to_connect(format!("{open} camera already open")));
        }
        device.open = Some(facing);
        Ok(capabilities)
    }

    #[instrument(name = "mock_session_start_bind", skip(self), fields(capture_size = %capture_size))]
    async fn on_start_bind(&self, capture_size: Size) -> SessionResult<()> {
        self.record(MockOperation::StartBind, Some(capture_size), None);
        self.enter(MockOperation::StartBind).await?;

        let mut device = self.lock_device();
        let Some(facing) = device.open else {
            return Err(CameraError::unknown("bind requested without an open camera"));
        };
        let supported = self.shared.profile.camera(facing).is_some_and(|camera| {
            camera.picture_sizes.contains(&capture_size) || camera.video_sizes.contains(&capture_size)
        });
        if !supported {
            return Err(CameraError::unknown(format!(
                "capture size {capture_size} not supported by the {facing} camera"
            )));
        }
        device.bound = Some(capture_size);
        Ok(())
    }

    #[instrument(name = "mock_session_start_preview", skip(self), fields(preview_size = %preview_size))]
    async fn on_start_preview(&self, preview_size: Size) -> SessionResult<()> {
        self.record(MockOperation::StartPreview, Some(preview_size), None);
        self.enter(MockOperation::StartPreview).await?;

        let mut device = self.lock_device();
        if device.bound.is_none() {
            return Err(CameraError::failed_to_start_preview("no surface bound"));
        }
        let supported = device
            .open
            .and_then(|facing| self.shared.profile.camera(facing))
            .is_some_and(|camera| camera.preview_sizes.contains(&preview_size));
        if !supported {
            return Err(CameraError::failed_to_start_preview(format!(
                "stream size {preview_size} not supported"
            )));
        }
        device.streaming = Some(preview_size);
        Ok(())
    }

    #[instrument(name = "mock_session_stop_preview", skip(self))]
    async fn on_stop_preview(&self) -> SessionResult<()> {
        self.record(MockOperation::StopPreview, None, None);
        let result = self.enter(MockOperation::StopPreview).await;
        self.lock_device().streaming = None;
        result
    }

    #[instrument(name = "mock_session_stop_bind", skip(self))]
    async fn on_stop_bind(&self) -> SessionResult<()> {
        self.record(MockOperation::StopBind, None, None);
        let result = self.enter(MockOperation::StopBind).await;
        let mut device = self.lock_device();
        device.streaming = None;
        device.bound = None;
        result
    }

    #[instrument(name = "mock_session_stop_engine", skip(self))]
    async fn on_stop_engine(&self) -> SessionResult<()> {
        self.record(MockOperation::StopEngine, None, None);
        let result = self.enter(MockOperation::StopEngine).await;
        *self.lock_device() = Device::default();
        result
    }

    fn preview_stream_available_sizes(&self) -> Vec<Size> {
        self.lock_device()
            .open
            .and_then(|facing| self.shared.profile.camera(facing))
            .map(|camera| camera.preview_sizes.clone())
            .unwrap_or_default()
    }
}
