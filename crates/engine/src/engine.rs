//! CameraEngine - three-stage camera session orchestrator.
//!
//! ENGINE (device session) -> BIND (surface attachment, capture size) ->
//! PREVIEW (stream size, streaming). Public operations are queued on one
//! lifecycle chain running on the engine thread; each stage additionally
//! serializes its own transitions through its [`Step`].

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use contracts::{CameraError, Capabilities, Facing, Mode, Reference, Size, SnapshotConfig};
use geometry::Angles;
use sizing::SizeSelector;
use tracing::{debug, error, info, instrument, warn};

use crate::error::{EngineError, Result};
use crate::executor::EngineExecutor;
use crate::listener::EngineListener;
use crate::options::EngineOptions;
use crate::session::CameraSession;
use crate::step::{ErrorHandler, Stage, Step, StepState, StepTask, TaskChain, Transition};

/// Snapshot of the three stage states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineState {
    pub engine: StepState,
    pub bind: StepState,
    pub preview: StepState,
}

impl EngineState {
    /// Parameters may be changed only while the engine stage is started.
    pub fn is_available(&self) -> bool {
        self.engine == StepState::Started
    }

    pub fn is_stopped(&self) -> bool {
        self.engine == StepState::Stopped
            && self.bind == StepState::Stopped
            && self.preview == StepState::Stopped
    }
}

/// Engine-owned state. Mutated from engine-thread jobs only.
struct EngineModel {
    facing: Facing,
    mode: Mode,
    angles: Angles,
    capabilities: Option<Capabilities>,
    /// Sensor frame
    capture_size: Option<Size>,
    /// Sensor frame
    preview_stream_size: Option<Size>,
    /// View frame
    surface_size: Option<Size>,
    picture_selector: SizeSelector,
    video_selector: SizeSelector,
    preview_selector: Option<SizeSelector>,
    snapshot: Option<SnapshotConfig>,
    /// Whether the owner currently wants the camera open
    wants_open: bool,
    /// Set once a transient failure triggered a restart; cleared by the
    /// next successful start.
    auto_restart: Option<Stage>,
}

impl EngineModel {
    fn new(angles: Angles, options: EngineOptions) -> Self {
        Self {
            facing: options.facing,
            mode: options.mode,
            angles,
            capabilities: None,
            capture_size: None,
            preview_stream_size: None,
            surface_size: None,
            picture_selector: options.picture_selector,
            video_selector: options.video_selector,
            preview_selector: options.preview_selector,
            snapshot: options.snapshot,
            wants_open: false,
            auto_restart: None,
        }
    }

    fn capture_selector(&self) -> &SizeSelector {
        match self.mode {
            Mode::Picture => &self.picture_selector,
            Mode::Video => &self.video_selector,
        }
    }

    fn clear_resolved(&mut self) {
        self.capabilities = None;
        self.capture_size = None;
        self.preview_stream_size = None;
    }
}

struct Inner<S> {
    session: S,
    listener: Arc<dyn EngineListener>,
    executor: Arc<EngineExecutor>,
    lifecycle: TaskChain,
    engine_step: Step,
    bind_step: Step,
    preview_step: Step,
    model: Mutex<EngineModel>,
    destroy_timeout: Duration,
}

/// Camera session orchestrator
///
/// Cheap to clone; clones drive the same session. Every lifecycle call
/// returns a [`StepTask`] that is already queued: await it to observe the
/// outcome, or drop it.
pub struct CameraEngine<S: CameraSession> {
    inner: Arc<Inner<S>>,
}

impl<S: CameraSession> Clone for CameraEngine<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S: CameraSession> CameraEngine<S> {
    /// Create the engine and its executor thread.
    pub fn new(session: S, listener: Arc<dyn EngineListener>, options: EngineOptions) -> Result<Self> {
        let angles = Angles::with(options.facing, 0, options.display_offset, options.device_orientation)?;
        let executor = Arc::new(
            EngineExecutor::new(options.name.clone()).map_err(|e| EngineError::Executor(e.to_string()))?,
        );
        let destroy_timeout = options.destroy_timeout;

        let inner = Arc::new_cyclic(|weak: &Weak<Inner<S>>| {
            let step = |stage| Step::new(stage, executor.clone(), error_handler(weak.clone(), stage));
            Inner {
                session,
                listener,
                lifecycle: TaskChain::new(executor.clone()),
                engine_step: step(Stage::Engine),
                bind_step: step(Stage::Bind),
                preview_step: step(Stage::Preview),
                executor: executor.clone(),
                model: Mutex::new(EngineModel::new(angles, options)),
                destroy_timeout,
            }
        });

        info!(executor = %inner.executor.name(), "camera engine created");
        Ok(Self { inner })
    }

    // ===== Lifecycle =====

    /// ENGINE, then BIND and PREVIEW if a surface is available.
    ///
    /// The task resolves with the outcome of this attempt only. A transient
    /// stage failure still resolves `Err`, while one automatic restart is
    /// queued behind it: await [`flush`](Self::flush) and check
    /// [`engine_state`](Self::engine_state) to tell a recovered session from
    /// a closed one. Unrecovered failures also reach `on_error`.
    pub fn open(&self) -> StepTask {
        self.inner.enqueue_lifecycle("open", |inner| async move {
            inner.set_wants_open(true);
            inner.start_all().await
        })
    }

    /// PREVIEW, BIND, ENGINE stops. Stages never started are skipped.
    pub fn close(&self) -> StepTask {
        self.inner.enqueue_lifecycle("close", |inner| async move {
            inner.set_wants_open(false);
            inner.stop_all(false).await
        })
    }

    /// Close if open, then open, as one queued operation. Failures resolve
    /// like [`open`](Self::open).
    pub fn restart(&self) -> StepTask {
        self.inner.enqueue_lifecycle("restart", |inner| async move {
            inner.set_wants_open(true);
            if let Err(err) = inner.stop_all(false).await {
                debug!(error = %err, "restart: stop failed, starting anyway");
            }
            inner.start_all().await
        })
    }

    /// Stop everything, swallowing failures, force every stage to STOPPED
    /// and shut the engine thread down. The engine is unusable afterwards.
    #[instrument(name = "camera_engine_destroy", skip(self))]
    pub async fn destroy(&self) {
        let inner = &self.inner;
        if inner.executor.is_shutdown() {
            return;
        }

        if inner.executor.is_engine_thread() {
            inner.set_wants_open(false);
            inner.stop_immediately().await;
        } else {
            let task = inner.enqueue_lifecycle("destroy", |inner| async move {
                inner.set_wants_open(false);
                inner.stop_all(true).await
            });
            // the bounded wait runs on the engine thread, so any executor can await destroy
            let limit = inner.destroy_timeout;
            let bounded = inner
                .executor
                .spawn(async move { tokio::time::timeout(limit, task).await });
            match bounded.await {
                Ok(Ok(Ok(()))) => {}
                Ok(Ok(Err(err))) => debug!(error = %err, "destroy: stop failure swallowed"),
                Ok(Err(_)) => warn!(timeout = ?limit, "destroy: stop did not settle in time"),
                Err(err) => debug!(error = %err, "destroy: bounded wait aborted"),
            }
        }

        for step in inner.steps() {
            step.force_stopped();
        }
        inner.model().clear_resolved();
        inner.executor.shutdown();
        info!("camera engine destroyed");
    }

    /// Resolves once every operation queued before it has finished,
    /// including error handling triggered by them.
    pub fn flush(&self) -> StepTask {
        self.inner.enqueue_update("flush", |_| async { Ok(()) })
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.executor.is_shutdown()
    }

    // ===== Surface =====

    /// The delivery surface appeared. Binds and starts preview if the
    /// engine is already open; with BIND already started it behaves like
    /// [`on_surface_changed`](Self::on_surface_changed).
    pub fn on_surface_available(&self, size: Size) -> StepTask {
        self.inner.enqueue_lifecycle("surface_available", move |inner| async move {
            inner.set_surface(Some(size));
            if inner.bind_step.is_started() {
                return inner.renegotiate_preview(size).await;
            }
            if !inner.can_start_bind() {
                return Ok(());
            }
            inner.start_bind().await?;
            if let Err(err) = inner.start_preview().await {
                warn!(error = %err, "preview failed after surface became available, unwinding BIND");
                let _ = inner.stop_bind(true).await;
                return Err(err);
            }
            Ok(())
        })
    }

    /// The surface changed size. Restarts PREVIEW if the negotiated stream
    /// size changes.
    pub fn on_surface_changed(&self, size: Size) -> StepTask {
        self.inner.enqueue_lifecycle("surface_changed", move |inner| async move {
            inner.set_surface(Some(size));
            inner.renegotiate_preview(size).await
        })
    }

    /// The surface went away. Stops PREVIEW and BIND; ENGINE stays open.
    pub fn on_surface_destroyed(&self) -> StepTask {
        self.inner.enqueue_lifecycle("surface_destroyed", |inner| async move {
            inner.set_surface(None);
            let preview = inner.stop_preview(false).await;
            let bind = inner.stop_bind(false).await;
            preview.and(bind)
        })
    }

    // ===== Parameters =====

    /// Switch camera. Restarts the session if it is open.
    pub fn set_facing(&self, facing: Facing) -> StepTask {
        self.inner.enqueue_lifecycle("set_facing", move |inner| async move {
            if !inner.update_model(|m| std::mem::replace(&mut m.facing, facing) != facing) {
                return Ok(());
            }
            info!(facing = %facing, "facing changed");
            inner.restart_if_open().await
        })
    }

    /// Switch capture mode. Restarts the session if it is open.
    pub fn set_mode(&self, mode: Mode) -> StepTask {
        self.inner.enqueue_lifecycle("set_mode", move |inner| async move {
            if !inner.update_model(|m| std::mem::replace(&mut m.mode, mode) != mode) {
                return Ok(());
            }
            info!(mode = %mode, "mode changed");
            inner.restart_if_open().await
        })
    }

    /// Selector for the capture size of `mode`, applied at the next bind.
    pub fn set_capture_size_selector(&self, mode: Mode, selector: SizeSelector) -> StepTask {
        self.inner.enqueue_update("set_capture_size_selector", move |inner| async move {
            inner.update_model(|m| match mode {
                Mode::Picture => m.picture_selector = selector,
                Mode::Video => m.video_selector = selector,
            });
            Ok(())
        })
    }

    /// Selector tried before the built-in preview policy, applied at the
    /// next preview start.
    pub fn set_preview_stream_size_selector(&self, selector: Option<SizeSelector>) -> StepTask {
        self.inner.enqueue_update("set_preview_stream_size_selector", move |inner| async move {
            inner.update_model(|m| m.preview_selector = selector);
            Ok(())
        })
    }

    /// Quantized device orientation (0/90/180/270).
    pub fn set_device_orientation(&self, degrees: u32) -> StepTask {
        self.inner.enqueue_update("set_device_orientation", move |inner| async move {
            inner.update_model(|m| m.angles.set_device_orientation(degrees))?;
            Ok(())
        })
    }

    /// Display rotation (0/90/180/270). Takes effect for sizes resolved
    /// afterwards.
    pub fn set_display_offset(&self, degrees: u32) -> StepTask {
        self.inner.enqueue_update("set_display_offset", move |inner| async move {
            inner.update_model(|m| m.angles.set_display_offset(degrees))?;
            Ok(())
        })
    }

    /// Failure reported by the hardware outside a stage operation, e.g. a
    /// device disconnect while streaming.
    pub fn report_error(&self, error: CameraError) {
        warn!(error = %error, "hardware error reported");
        self.inner
            .dispatch_error(Stage::Engine, Transition::Start, EngineError::Hardware(error));
    }

    // ===== Snapshots of engine state =====

    pub fn engine_state(&self) -> EngineState {
        EngineState {
            engine: self.inner.engine_step.state(),
            bind: self.inner.bind_step.state(),
            preview: self.inner.preview_step.state(),
        }
    }

    pub fn capabilities(&self) -> Option<Capabilities> {
        self.inner.model().capabilities.clone()
    }

    pub fn facing(&self) -> Facing {
        self.inner.model().facing
    }

    pub fn mode(&self) -> Mode {
        self.inner.model().mode
    }

    pub fn angles(&self) -> Angles {
        self.inner.model().angles
    }

    /// Resolved capture size in `reference`, once BIND started.
    pub fn capture_size(&self, reference: Reference) -> Option<Size> {
        let model = self.inner.model();
        let flip = model.angles.flip(Reference::Sensor, reference);
        model.capture_size.map(|size| size.flip_if(flip))
    }

    /// Capture size while in picture mode.
    pub fn picture_size(&self, reference: Reference) -> Option<Size> {
        (self.mode() == Mode::Picture)
            .then(|| self.capture_size(reference))
            .flatten()
    }

    /// Capture size while in video mode.
    pub fn video_size(&self, reference: Reference) -> Option<Size> {
        (self.mode() == Mode::Video)
            .then(|| self.capture_size(reference))
            .flatten()
    }

    /// Negotiated preview stream size in `reference`, once PREVIEW started.
    pub fn preview_stream_size(&self, reference: Reference) -> Option<Size> {
        let model = self.inner.model();
        let flip = model.angles.flip(Reference::Sensor, reference);
        model.preview_stream_size.map(|size| size.flip_if(flip))
    }

    pub fn surface_size(&self, reference: Reference) -> Option<Size> {
        let model = self.inner.model();
        let flip = model.angles.flip(Reference::View, reference);
        model.surface_size.map(|size| size.flip_if(flip))
    }

    /// Preview stream size scaled into the snapshot bounds, aspect kept.
    pub fn uncropped_snapshot_size(&self, reference: Reference) -> Option<Size> {
        let model = self.inner.model();
        let base = model
            .preview_stream_size?
            .flip_if(model.angles.flip(Reference::Sensor, reference));
        let snapshot = model.snapshot.unwrap_or_default();
        let (mut max_width, mut max_height) = (snapshot.max_width, snapshot.max_height);
        // bounds are configured in the view frame
        if model.angles.flip(reference, Reference::View) {
            std::mem::swap(&mut max_width, &mut max_height);
        }
        Some(geometry::uncropped_snapshot_size(base, max_width, max_height))
    }

    /// The hardware collaborator.
    pub fn session(&self) -> &S {
        &self.inner.session
    }
}

fn error_handler<S: CameraSession>(weak: Weak<Inner<S>>, stage: Stage) -> ErrorHandler {
    Arc::new(move |direction, error| {
        if let Some(inner) = weak.upgrade() {
            inner.dispatch_error(stage, direction, error);
        }
    })
}

impl<S: CameraSession> Inner<S> {
    fn model(&self) -> MutexGuard<'_, EngineModel> {
        self.model.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update_model<T>(&self, f: impl FnOnce(&mut EngineModel) -> T) -> T {
        f(&mut self.model())
    }

    fn steps(&self) -> [&Step; 3] {
        [&self.engine_step, &self.bind_step, &self.preview_step]
    }

    fn set_wants_open(&self, wants_open: bool) {
        self.model().wants_open = wants_open;
    }

    fn set_surface(&self, surface: Option<Size>) {
        self.model().surface_size = surface;
    }

    fn current_preview_stream_size(&self) -> Option<Size> {
        self.model().preview_stream_size
    }

    fn can_start_bind(&self) -> bool {
        self.engine_step.is_started()
            && self.bind_step.is_stopping_or_stopped()
            && self.model().surface_size.is_some()
    }

    fn can_start_preview(&self) -> bool {
        self.bind_step.is_started()
            && self.preview_step.is_stopping_or_stopped()
            && self.model().surface_size.is_some()
    }

    fn require_started(&self, stage: Stage, requires: Stage) -> Result<()> {
        let step = match requires {
            Stage::Engine => &self.engine_step,
            Stage::Bind => &self.bind_step,
            Stage::Preview => &self.preview_step,
        };
        if step.is_started() {
            Ok(())
        } else {
            Err(EngineError::DependencyOrder { stage, requires })
        }
    }

    // ===== Queueing =====

    /// Queue a lifecycle job. Defects tear the session down before the
    /// returned task resolves with the error.
    fn enqueue_lifecycle<F, Fut>(self: &Arc<Self>, operation: &'static str, job: F) -> StepTask
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.enqueue(operation, true, job)
    }

    /// Queue a parameter update. Errors are only returned to the caller.
    fn enqueue_update<F, Fut>(self: &Arc<Self>, operation: &'static str, job: F) -> StepTask
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.enqueue(operation, false, job)
    }

    fn enqueue<F, Fut>(self: &Arc<Self>, operation: &'static str, teardown_on_defect: bool, job: F) -> StepTask
    where
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let inner = self.clone();
        debug!(operation, "queued");
        self.lifecycle.enqueue(async move {
            let started = Instant::now();
            let result = job(inner.clone()).await;
            let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
            observability::record_lifecycle_latency_ms(operation, elapsed_ms, result.is_ok());

            match &result {
                Ok(()) => debug!(operation, elapsed_ms, "operation completed"),
                Err(err) if teardown_on_defect && err.is_defect() => {
                    inner.raise_defect(operation, err).await;
                }
                Err(err) => debug!(operation, error = %err, "operation failed"),
            }
            result
        })
    }

    // ===== Error routing =====

    /// Camera errors are handled by a job queued behind the current one.
    /// Defects travel back through the failing operation's own task.
    fn dispatch_error(self: &Arc<Self>, stage: Stage, direction: Transition, error: EngineError) {
        let Some(camera_error) = error.camera_error().cloned() else {
            debug!(stage = %stage, error = %error, "defect, left to the failing operation");
            return;
        };
        let restartable = direction == Transition::Start;
        let inner = self.clone();
        let _ = self.lifecycle.enqueue(async move {
            inner.handle_camera_error(stage, camera_error, restartable).await;
            Ok(())
        });
    }

    #[instrument(name = "camera_engine_handle_error", skip(self, stage, error), fields(stage = %stage, kind = %error.kind))]
    async fn handle_camera_error(self: &Arc<Self>, stage: Stage, error: CameraError, restartable: bool) {
        if restartable && error.is_transient() && self.claim_auto_restart(stage) {
            warn!(error = %error, "transient camera error, restarting session once");
            observability::record_engine_error("restarted");
            let _ = self.stop_all(true).await;
            if let Err(err) = self.start_all().await {
                // camera failures of the retry are dispatched by their own step
                if err.is_defect() {
                    self.raise_defect("auto_restart", &err).await;
                }
            }
            return;
        }

        error!(error = %error, "camera error");
        observability::record_engine_error("surfaced");
        self.update_model(|m| {
            m.auto_restart = None;
            m.wants_open = false;
        });
        self.stop_immediately().await;
        self.listener.on_error(&error);
    }

    fn claim_auto_restart(&self, stage: Stage) -> bool {
        let mut model = self.model();
        if !model.wants_open || model.auto_restart.is_some() {
            return false;
        }
        model.auto_restart = Some(stage);
        true
    }

    async fn raise_defect(self: &Arc<Self>, operation: &str, err: &EngineError) {
        error!(operation, error = %err, "configuration defect, tearing session down");
        observability::record_engine_error("defect");
        self.set_wants_open(false);
        self.stop_immediately().await;
    }

    /// Stop every stage that is not already stopped by calling the session
    /// directly, swallowing errors, then force all steps to STOPPED.
    async fn stop_immediately(self: &Arc<Self>) {
        let was_open = self.engine_step.state() != StepState::Stopped;

        if self.preview_step.state() != StepState::Stopped {
            if let Err(err) = self.session.on_stop_preview().await {
                debug!(error = %err, "stop_immediately: PREVIEW stop failed");
            }
        }
        if self.bind_step.state() != StepState::Stopped {
            if let Err(err) = self.session.on_stop_bind().await {
                debug!(error = %err, "stop_immediately: BIND stop failed");
            }
        }
        if was_open {
            if let Err(err) = self.session.on_stop_engine().await {
                debug!(error = %err, "stop_immediately: ENGINE stop failed");
            }
        }

        for step in self.steps() {
            step.force_stopped();
        }
        self.model().clear_resolved();
        if was_open {
            self.listener.on_camera_closed();
        }
    }

    // ===== Stage sequences =====

    #[instrument(name = "camera_engine_start_all", skip(self))]
    async fn start_all(self: &Arc<Self>) -> Result<()> {
        self.start_engine().await?;

        if self.can_start_bind() {
            if let Err(err) = self.start_bind().await {
                warn!(error = %err, "BIND failed, unwinding ENGINE");
                let _ = self.stop_engine(true).await;
                return Err(err);
            }
        }

        if self.can_start_preview() {
            if let Err(err) = self.start_preview().await {
                warn!(error = %err, "PREVIEW failed, unwinding BIND and ENGINE");
                let _ = self.stop_bind(true).await;
                let _ = self.stop_engine(true).await;
                return Err(err);
            }
        }

        self.update_model(|m| m.auto_restart = None);
        Ok(())
    }

    /// Every stop runs even if an earlier one failed; the first error wins.
    #[instrument(name = "camera_engine_stop_all", skip(self))]
    async fn stop_all(self: &Arc<Self>, swallow: bool) -> Result<()> {
        let preview = self.stop_preview(swallow).await;
        let bind = self.stop_bind(swallow).await;
        let engine = self.stop_engine(swallow).await;
        preview.and(bind).and(engine)
    }

    async fn restart_if_open(self: &Arc<Self>) -> Result<()> {
        if !self.engine_step.is_started_or_starting() {
            return Ok(());
        }
        if let Err(err) = self.stop_all(false).await {
            debug!(error = %err, "stop before restart failed, starting anyway");
        }
        self.start_all().await
    }

    // ===== Stages =====

    fn start_engine(self: &Arc<Self>) -> StepTask {
        if self.engine_step.is_started_or_starting() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        let hook = self.clone();
        self.engine_step.do_start(
            false,
            move || async move {
                let (facing, mode) = inner.update_model(|m| (m.facing, m.mode));
                let capabilities = inner
                    .session
                    .on_start_engine(facing, mode)
                    .await
                    .map_err(|e| EngineError::stage(Stage::Engine, e))?;
                inner.apply_capabilities(facing, capabilities)
            },
            Some(Box::new(move || {
                let capabilities = hook.model().capabilities.clone();
                if let Some(capabilities) = capabilities {
                    hook.listener.on_camera_opened(&capabilities);
                }
            })),
        )
    }

    fn apply_capabilities(&self, facing: Facing, capabilities: Capabilities) -> Result<()> {
        let mut model = self.model();
        model.angles.set_sensor_offset(facing, capabilities.sensor_offset)?;
        info!(
            facing = %facing,
            sensor_offset = capabilities.sensor_offset,
            picture_sizes = capabilities.picture_sizes.len(),
            video_sizes = capabilities.video_sizes.len(),
            "camera opened"
        );
        model.capabilities = Some(capabilities);
        Ok(())
    }

    fn stop_engine(self: &Arc<Self>, swallow: bool) -> StepTask {
        if self.engine_step.is_stopping_or_stopped() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        let hook = self.clone();
        self.engine_step.do_stop(
            swallow,
            move || async move {
                let result = inner.session.on_stop_engine().await;
                inner.update_model(EngineModel::clear_resolved);
                result.map_err(|e| EngineError::stage(Stage::Engine, e))
            },
            Some(Box::new(move || hook.listener.on_camera_closed())),
        )
    }

    fn start_bind(self: &Arc<Self>) -> StepTask {
        if self.bind_step.is_started_or_starting() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        self.bind_step.do_start(
            false,
            move || async move {
                inner.require_started(Stage::Bind, Stage::Engine)?;
                let capture_size = inner.resolve_capture_size()?;
                if let Err(e) = inner.session.on_start_bind(capture_size).await {
                    inner.update_model(|m| m.capture_size = None);
                    return Err(EngineError::stage(Stage::Bind, e));
                }
                Ok(())
            },
            None,
        )
    }

    fn resolve_capture_size(&self) -> Result<Size> {
        let mut model = self.model();
        let capabilities = model.capabilities.as_ref().ok_or(EngineError::DependencyOrder {
            stage: Stage::Bind,
            requires: Stage::Engine,
        })?;
        let candidates = capabilities.capture_sizes(model.mode);
        if candidates.is_empty() {
            return Err(EngineError::stage(
                Stage::Bind,
                CameraError::unknown(format!("device reported no {} sizes", model.mode)),
            ));
        }
        let size = geometry::compute_capture_size(&model.angles, candidates, model.capture_selector())?;
        model.capture_size = Some(size);
        drop(model);

        info!(capture_size = %size, "capture size resolved");
        observability::record_resolved_size("capture", size);
        Ok(size)
    }

    fn stop_bind(self: &Arc<Self>, swallow: bool) -> StepTask {
        if self.bind_step.is_stopping_or_stopped() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        self.bind_step.do_stop(
            swallow,
            move || async move {
                let result = inner.session.on_stop_bind().await;
                inner.update_model(|m| {
                    m.capture_size = None;
                    m.preview_stream_size = None;
                });
                result.map_err(|e| EngineError::stage(Stage::Bind, e))
            },
            None,
        )
    }

    fn start_preview(self: &Arc<Self>) -> StepTask {
        if self.preview_step.is_started_or_starting() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        self.preview_step.do_start(
            false,
            move || async move {
                inner.require_started(Stage::Preview, Stage::Bind)?;
                let available = inner.session.preview_stream_available_sizes();
                let size = inner.compute_preview_stream_size(&available)?;
                inner.update_model(|m| m.preview_stream_size = Some(size));
                info!(preview_stream_size = %size, "preview stream size resolved");
                observability::record_resolved_size("preview", size);

                if let Err(e) = inner.session.on_start_preview(size).await {
                    inner.update_model(|m| m.preview_stream_size = None);
                    return Err(EngineError::stage(Stage::Preview, e));
                }
                Ok(())
            },
            None,
        )
    }

    /// Restart PREVIEW if the stream size for `surface` differs from the
    /// running one. No-op while PREVIEW is not started.
    async fn renegotiate_preview(self: &Arc<Self>, surface: Size) -> Result<()> {
        if !self.preview_step.is_started() {
            return Ok(());
        }

        let available = self.session.preview_stream_available_sizes();
        let next = self.compute_preview_stream_size(&available)?;
        if self.current_preview_stream_size() == Some(next) {
            debug!(surface = %surface, preview = %next, "preview stream size unchanged");
            return Ok(());
        }

        info!(surface = %surface, preview = %next, "preview stream size changed, restarting PREVIEW");
        self.listener.on_preview_stream_size_changed(next);
        self.stop_preview(false).await?;
        self.start_preview().await
    }

    /// Preview stream size for the current surface, sensor frame. Not stored.
    /// An empty hardware list is a preview failure, not a sizing defect.
    fn compute_preview_stream_size(&self, available: &[Size]) -> Result<Size> {
        if available.is_empty() {
            return Err(EngineError::stage(
                Stage::Preview,
                CameraError::failed_to_start_preview("device reported no preview stream sizes"),
            ));
        }
        let model = self.model();
        let capture_size = model.capture_size.ok_or(EngineError::DependencyOrder {
            stage: Stage::Preview,
            requires: Stage::Bind,
        })?;
        let surface = model.surface_size.unwrap_or_default();
        Ok(geometry::compute_preview_stream_size(
            &model.angles,
            available,
            capture_size,
            surface,
            model.preview_selector.as_ref(),
        )?)
    }

    fn stop_preview(self: &Arc<Self>, swallow: bool) -> StepTask {
        if self.preview_step.is_stopping_or_stopped() {
            return TaskChain::completed();
        }
        let inner = self.clone();
        self.preview_step.do_stop(
            swallow,
            move || async move {
                let result = inner.session.on_stop_preview().await;
                inner.update_model(|m| m.preview_stream_size = None);
                result.map_err(|e| EngineError::stage(Stage::Preview, e))
            },
            None,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::EngineEvent;
    use crate::mock_session::{MockConfig, MockOperation, MockSession};
    use contracts::{AspectRatio, DeviceProfile, ErrorKind};
    use sizing::SizingError;
    use tokio::sync::mpsc;

    type Events = mpsc::UnboundedReceiver<EngineEvent>;

    const PORTRAIT: Size = Size::new(1080, 1920);

    fn engine_with(session: MockSession, options: EngineOptions) -> (CameraEngine<MockSession>, Events) {
        let (tx, rx) = mpsc::unbounded_channel();
        let engine = CameraEngine::new(session, Arc::new(tx), options).unwrap();
        (engine, rx)
    }

    fn engine() -> (CameraEngine<MockSession>, Events) {
        engine_with(MockSession::new(DeviceProfile::default()), EngineOptions::default())
    }

    async fn wait_until(what: &str, mut condition: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !condition() {
            assert!(Instant::now() < deadline, "timed out waiting for {what}");
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn next_error(events: &mut Events) -> CameraError {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
                .await
                .expect("timed out waiting for error event")
                .expect("event channel closed");
            if let EngineEvent::Error(err) = event {
                return err;
            }
        }
    }

    fn drain(events: &mut Events) -> Vec<EngineEvent> {
        let mut out = Vec::new();
        while let Ok(event) = events.try_recv() {
            out.push(event);
        }
        out
    }

    fn all_started(engine: &CameraEngine<MockSession>) -> bool {
        let state = engine.engine_state();
        state.engine == StepState::Started
            && state.bind == StepState::Started
            && state.preview == StepState::Started
    }

    #[tokio::test]
    async fn test_open_with_surface_runs_all_stages() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        assert!(all_started(&engine));
        assert!(engine.engine_state().is_available());
        assert_eq!(
            engine.session().operations(),
            vec![
                MockOperation::StartEngine,
                MockOperation::StartBind,
                MockOperation::StartPreview
            ]
        );

        // back sensor at 90: view frame is portrait
        assert_eq!(engine.capture_size(Reference::Sensor), Some(Size::new(4000, 3000)));
        assert_eq!(engine.capture_size(Reference::View), Some(Size::new(3000, 4000)));
        assert_eq!(engine.picture_size(Reference::Sensor), Some(Size::new(4000, 3000)));
        assert_eq!(engine.video_size(Reference::Sensor), None);
        // 3:4 in view, nothing 3:4 covers 1080x1920: smallest covering stream
        assert_eq!(engine.preview_stream_size(Reference::Sensor), Some(Size::new(1920, 1080)));
        assert_eq!(engine.session().streaming_size(), Some(Size::new(1920, 1080)));
        assert_eq!(engine.surface_size(Reference::Sensor), Some(Size::new(1920, 1080)));

        let opened = drain(&mut events);
        assert!(matches!(opened.as_slice(), [EngineEvent::CameraOpened(caps)] if caps.sensor_offset == 90));
    }

    #[tokio::test]
    async fn test_open_without_surface_then_surface_available() {
        let (engine, _events) = engine();
        engine.open().await.unwrap();

        let state = engine.engine_state();
        assert_eq!(state.engine, StepState::Started);
        assert_eq!(state.bind, StepState::Stopped);
        assert!(engine.capture_size(Reference::Sensor).is_none());

        engine.on_surface_available(PORTRAIT).await.unwrap();
        assert!(all_started(&engine));
    }

    #[tokio::test]
    async fn test_close_runs_stages_in_reverse() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();
        engine.session().clear_calls();
        drain(&mut events);

        engine.close().await.unwrap();

        assert!(engine.engine_state().is_stopped());
        assert_eq!(
            engine.session().operations(),
            vec![
                MockOperation::StopPreview,
                MockOperation::StopBind,
                MockOperation::StopEngine
            ]
        );
        assert_eq!(drain(&mut events), vec![EngineEvent::CameraClosed]);
        assert!(engine.capture_size(Reference::Sensor).is_none());
        assert!(engine.preview_stream_size(Reference::Sensor).is_none());
        assert!(engine.capabilities().is_none());

        // closing again is a no-op
        engine.session().clear_calls();
        engine.close().await.unwrap();
        assert!(engine.session().calls().is_empty());
    }

    #[tokio::test]
    async fn test_restart_matches_close_then_open() {
        for (with_surface, open_first) in [(false, false), (false, true), (true, false), (true, true)] {
            let (restarted, _r) = engine();
            let (reopened, _o) = engine();
            for engine in [&restarted, &reopened] {
                if with_surface {
                    engine.on_surface_available(PORTRAIT).await.unwrap();
                }
                if open_first {
                    engine.open().await.unwrap();
                }
            }

            restarted.restart().await.unwrap();
            reopened.close().await.unwrap();
            reopened.open().await.unwrap();

            assert_eq!(restarted.engine_state(), reopened.engine_state());
            assert_eq!(
                restarted.preview_stream_size(Reference::Sensor),
                reopened.preview_stream_size(Reference::Sensor)
            );
        }
    }

    #[tokio::test]
    async fn test_bind_failure_unwinds_engine_and_surfaces() {
        let (engine, mut events) = engine();
        engine
            .session()
            .fail_next(MockOperation::StartBind, CameraError::failed_to_connect("busy"));
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.open().await.unwrap_err();
        assert_eq!(
            err,
            EngineError::stage(Stage::Bind, CameraError::failed_to_connect("busy"))
        );

        let surfaced = next_error(&mut events).await;
        assert_eq!(surfaced.kind, ErrorKind::FailedToConnect);
        assert!(engine.engine_state().is_stopped());
        assert_eq!(
            engine.session().operations(),
            vec![
                MockOperation::StartEngine,
                MockOperation::StartBind,
                MockOperation::StopEngine
            ]
        );
    }

    #[tokio::test]
    async fn test_preview_failure_unwinds_in_reverse_order() {
        let (engine, mut events) = engine();
        engine.session().fail_next(
            MockOperation::StartPreview,
            CameraError::failed_to_start_preview("refused"),
        );
        engine.on_surface_available(PORTRAIT).await.unwrap();

        assert!(engine.open().await.is_err());
        assert_eq!(next_error(&mut events).await.kind, ErrorKind::FailedToStartPreview);
        assert_eq!(
            engine.session().operations(),
            vec![
                MockOperation::StartEngine,
                MockOperation::StartBind,
                MockOperation::StartPreview,
                MockOperation::StopBind,
                MockOperation::StopEngine
            ]
        );
        assert!(engine.engine_state().is_stopped());
    }

    #[tokio::test]
    async fn test_transient_failure_restarts_once() {
        let (engine, mut events) = engine();
        engine
            .session()
            .fail_next(MockOperation::StartPreview, CameraError::disconnected("glitch"));
        engine.on_surface_available(PORTRAIT).await.unwrap();

        assert!(engine.open().await.is_err());
        wait_until("automatic restart", || all_started(&engine)).await;

        let starts = engine
            .session()
            .operations()
            .into_iter()
            .filter(|op| *op == MockOperation::StartPreview)
            .count();
        assert_eq!(starts, 2);
        assert!(drain(&mut events)
            .iter()
            .all(|event| !matches!(event, EngineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_transient_failure_recovery_visible_after_flush() {
        let (engine, _events) = engine();
        engine
            .session()
            .fail_next(MockOperation::StartBind, CameraError::disconnected("glitch"));
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.open().await.unwrap_err();
        assert!(err.camera_error().is_some_and(CameraError::is_transient));
        engine.flush().await.unwrap();
        assert!(all_started(&engine));
    }

    #[tokio::test]
    async fn test_second_consecutive_transient_failure_is_surfaced() {
        let (engine, mut events) = engine();
        engine
            .session()
            .fail_times(MockOperation::StartPreview, CameraError::disconnected("gone"), 2);
        engine.on_surface_available(PORTRAIT).await.unwrap();

        assert!(engine.open().await.is_err());
        let surfaced = next_error(&mut events).await;
        assert_eq!(surfaced.kind, ErrorKind::Disconnected);
        assert!(engine.engine_state().is_stopped());

        let starts = engine
            .session()
            .operations()
            .into_iter()
            .filter(|op| *op == MockOperation::StartPreview)
            .count();
        assert_eq!(starts, 2);
    }

    #[tokio::test]
    async fn test_reported_disconnect_restarts_open_session() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();
        engine.session().clear_calls();

        engine.report_error(CameraError::disconnected("usb reset"));
        wait_until("restart", || engine.session().calls().len() == 6).await;
        wait_until("all stages", || all_started(&engine)).await;

        assert_eq!(
            engine.session().operations(),
            vec![
                MockOperation::StopPreview,
                MockOperation::StopBind,
                MockOperation::StopEngine,
                MockOperation::StartEngine,
                MockOperation::StartBind,
                MockOperation::StartPreview
            ]
        );
        assert!(drain(&mut events)
            .iter()
            .all(|event| !matches!(event, EngineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_reported_error_while_closed_is_surfaced() {
        let (engine, mut events) = engine();
        engine.report_error(CameraError::disconnected("late"));
        assert_eq!(next_error(&mut events).await.kind, ErrorKind::Disconnected);
        assert!(engine.session().calls().is_empty());
    }

    #[tokio::test]
    async fn test_surface_change_restarts_preview_only_when_size_changes() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();
        engine.session().clear_calls();
        drain(&mut events);

        engine.on_surface_changed(PORTRAIT).await.unwrap();
        assert!(engine.session().calls().is_empty());

        engine.on_surface_changed(Size::new(720, 960)).await.unwrap();
        assert_eq!(
            engine.session().operations(),
            vec![MockOperation::StopPreview, MockOperation::StartPreview]
        );
        assert_eq!(engine.preview_stream_size(Reference::Sensor), Some(Size::new(1440, 1080)));
        assert_eq!(
            drain(&mut events),
            vec![EngineEvent::PreviewStreamSizeChanged(Size::new(1440, 1080))]
        );
        assert!(all_started(&engine));
    }

    #[tokio::test]
    async fn test_surface_destroyed_keeps_engine_open() {
        let (engine, _events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        engine.on_surface_destroyed().await.unwrap();
        let state = engine.engine_state();
        assert_eq!(state.engine, StepState::Started);
        assert_eq!(state.bind, StepState::Stopped);
        assert_eq!(state.preview, StepState::Stopped);
        assert!(engine.surface_size(Reference::View).is_none());
    }

    #[tokio::test]
    async fn test_set_facing_restarts_with_new_camera() {
        let (engine, _events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        engine.set_facing(Facing::Front).await.unwrap();

        assert!(all_started(&engine));
        assert_eq!(engine.session().open_facing(), Some(Facing::Front));
        assert_eq!(engine.angles().sensor_offset(), 270);
        assert_eq!(engine.capture_size(Reference::Sensor), Some(Size::new(3264, 2448)));

        // same facing again: nothing happens
        engine.session().clear_calls();
        engine.set_facing(Facing::Front).await.unwrap();
        assert!(engine.session().calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_mode_uses_video_sizes() {
        let (engine, _events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        engine.set_mode(Mode::Video).await.unwrap();
        assert_eq!(engine.video_size(Reference::Sensor), Some(Size::new(3840, 2160)));
        assert_eq!(engine.picture_size(Reference::Sensor), None);
    }

    #[tokio::test]
    async fn test_capture_selector_applies_on_next_bind() {
        let (engine, _events) = engine();
        let tall = sizing::aspect_ratio(AspectRatio::new(9, 16).unwrap(), 0.0);
        engine.set_capture_size_selector(Mode::Picture, tall).await.unwrap();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        assert_eq!(engine.capture_size(Reference::Sensor), Some(Size::new(3840, 2160)));
        assert_eq!(engine.capture_size(Reference::View), Some(Size::new(2160, 3840)));
    }

    #[tokio::test]
    async fn test_fabricating_selector_is_a_defect() {
        let (engine, mut events) = engine();
        let liar = SizeSelector::from_fn("liar", |_| vec![Size::new(123, 45)]);
        engine.set_preview_stream_size_selector(Some(liar)).await.unwrap();
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.open().await.unwrap_err();
        assert!(matches!(err, EngineError::Sizing(SizingError::Fabricated { .. })));
        assert!(err.is_defect());
        assert!(engine.engine_state().is_stopped());
        assert!(engine.session().open_facing().is_none());
        assert!(drain(&mut events)
            .iter()
            .all(|event| !matches!(event, EngineEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_bind_before_engine_is_dependency_defect() {
        let (engine, _events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.inner.start_bind().await.unwrap_err();
        assert_eq!(
            err,
            EngineError::DependencyOrder {
                stage: Stage::Bind,
                requires: Stage::Engine
            }
        );
        assert!(engine.session().calls().is_empty());
    }

    #[tokio::test]
    async fn test_unsanitized_orientation_rejected_without_teardown() {
        let (engine, _events) = engine();
        engine.open().await.unwrap();

        let err = engine.set_device_orientation(45).await.unwrap_err();
        assert!(matches!(err, EngineError::Angles(_)));
        assert!(engine.engine_state().is_available());

        engine.set_device_orientation(270).await.unwrap();
        // back camera: (90 + 270) % 360
        assert_eq!(engine.angles().offset(Reference::Sensor, Reference::Output), 0);
    }

    #[tokio::test]
    async fn test_concurrent_calls_never_overlap_in_session() {
        let session = MockSession::with_config(
            DeviceProfile::default(),
            MockConfig {
                latency: Duration::from_millis(2),
                failures: Vec::new(),
            },
        );
        let (engine, _events) = engine_with(session, EngineOptions::default());
        let _ = engine.on_surface_available(PORTRAIT);

        let mut tasks = Vec::new();
        for i in 0..8 {
            let worker = engine.clone();
            tasks.push(tokio::spawn(async move {
                let task = match i % 4 {
                    0 => worker.open(),
                    1 => worker.restart(),
                    2 => worker.close(),
                    _ => worker.set_facing(if i % 2 == 0 { Facing::Front } else { Facing::Back }),
                };
                task.await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        engine.open().await.unwrap();

        assert_eq!(engine.session().max_in_flight(), 1);
        assert!(all_started(&engine));
    }

    #[tokio::test]
    async fn test_uncropped_snapshot_size() {
        let mut options = EngineOptions::default();
        options.snapshot = Some(SnapshotConfig {
            max_width: Some(540),
            max_height: None,
        });
        let (engine, _events) = engine_with(MockSession::new(DeviceProfile::default()), options);
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();

        // preview 1920x1080 sensor = 1080x1920 view, width bounded to 540
        assert_eq!(engine.uncropped_snapshot_size(Reference::View), Some(Size::new(540, 960)));
        assert_eq!(engine.uncropped_snapshot_size(Reference::Sensor), Some(Size::new(960, 540)));
    }

    #[tokio::test]
    async fn test_surface_available_while_bound_renegotiates_preview() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();
        engine.session().clear_calls();
        drain(&mut events);

        engine.on_surface_available(Size::new(720, 960)).await.unwrap();

        assert_eq!(engine.surface_size(Reference::View), Some(Size::new(720, 960)));
        assert_eq!(
            engine.session().operations(),
            vec![MockOperation::StopPreview, MockOperation::StartPreview]
        );
        assert_eq!(engine.preview_stream_size(Reference::View), Some(Size::new(1080, 1440)));
        assert_eq!(
            drain(&mut events),
            vec![EngineEvent::PreviewStreamSizeChanged(Size::new(1440, 1080))]
        );
        assert!(all_started(&engine));
    }

    #[tokio::test]
    async fn test_empty_capture_list_is_surfaced_bind_failure() {
        let mut profile = DeviceProfile::default();
        profile.cameras[0].video_sizes.clear();
        let options = EngineOptions {
            mode: Mode::Video,
            ..Default::default()
        };
        let (engine, mut events) = engine_with(MockSession::new(profile), options);
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.open().await.unwrap_err();
        assert!(!err.is_defect());
        assert!(matches!(err, EngineError::StageFailed { stage: Stage::Bind, .. }));
        assert_eq!(next_error(&mut events).await.kind, ErrorKind::Unknown);
        assert!(engine.engine_state().is_stopped());
    }

    #[tokio::test]
    async fn test_empty_preview_list_is_surfaced_preview_failure() {
        let mut profile = DeviceProfile::default();
        profile.cameras[0].preview_sizes.clear();
        let (engine, mut events) = engine_with(MockSession::new(profile), EngineOptions::default());
        engine.on_surface_available(PORTRAIT).await.unwrap();

        let err = engine.open().await.unwrap_err();
        assert!(matches!(err, EngineError::StageFailed { stage: Stage::Preview, .. }));
        assert_eq!(next_error(&mut events).await.kind, ErrorKind::FailedToStartPreview);
        assert!(engine.engine_state().is_stopped());
    }

    #[test]
    fn test_destroy_awaitable_outside_tokio() {
        let (engine, _events) = engine();
        futures::executor::block_on(engine.on_surface_available(PORTRAIT)).unwrap();
        futures::executor::block_on(engine.open()).unwrap();

        futures::executor::block_on(engine.destroy());

        assert!(engine.is_destroyed());
        assert!(engine.engine_state().is_stopped());
        assert!(engine.session().open_facing().is_none());
    }

    #[tokio::test]
    async fn test_destroy_stops_and_shuts_down() {
        let (engine, mut events) = engine();
        engine.on_surface_available(PORTRAIT).await.unwrap();
        engine.open().await.unwrap();
        drain(&mut events);

        engine.destroy().await;

        assert!(engine.is_destroyed());
        assert!(engine.engine_state().is_stopped());
        assert!(engine.session().open_facing().is_none());
        assert_eq!(drain(&mut events), vec![EngineEvent::CameraClosed]);
        assert_eq!(engine.open().await, Err(EngineError::Shutdown));

        // idempotent
        engine.destroy().await;
    }
}
