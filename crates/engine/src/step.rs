//! Step - serialized start/stop state machine for one lifecycle stage.
//!
//! Every transition is appended to a future chain: it is spawned on the
//! engine executor and first awaits the previous transition (whatever its
//! outcome). Two transitions of the same step therefore never overlap.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use futures::future::{BoxFuture, FutureExt, Shared};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};
use crate::executor::EngineExecutor;

/// Handle to a queued operation. Clone it to wait from several places;
/// dropping it does not cancel the operation.
pub type StepTask = Shared<BoxFuture<'static, Result<()>>>;

/// Invoked with a failed transition unless the caller asked to swallow it.
pub type ErrorHandler = Arc<dyn Fn(Transition, EngineError) + Send + Sync>;

/// Runs after a successful transition, on the engine thread.
pub type Hook = Box<dyn FnOnce() + Send>;

/// The three lifecycle stages, in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Engine,
    Bind,
    Preview,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Engine => "ENGINE",
            Self::Bind => "BIND",
            Self::Preview => "PREVIEW",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StepState {
    Stopped = 0,
    Stopping = 1,
    Starting = 2,
    Started = 3,
}

impl StepState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Stopping,
            2 => Self::Starting,
            3 => Self::Started,
            _ => Self::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Stopped => "stopped",
            Self::Stopping => "stopping",
            Self::Starting => "starting",
            Self::Started => "started",
        }
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// FIFO of engine-thread jobs linked through their completion futures.
#[derive(Clone)]
pub struct TaskChain {
    executor: Arc<EngineExecutor>,
    tail: Arc<Mutex<StepTask>>,
}

impl TaskChain {
    pub fn new(executor: Arc<EngineExecutor>) -> Self {
        Self {
            executor,
            tail: Arc::new(Mutex::new(Self::completed())),
        }
    }

    /// An already successful task.
    pub fn completed() -> StepTask {
        futures::future::ready(Ok(())).boxed().shared()
    }

    /// Append `job`. It runs once every previously enqueued job settled.
    pub fn enqueue<F>(&self, job: F) -> StepTask
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        if self.executor.is_shutdown() {
            return futures::future::ready(Err(EngineError::Shutdown)).boxed().shared();
        }
        let mut tail = self.tail.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = tail.clone();
        let handle = self.executor.spawn(async move {
            let _ = previous.await;
            job.await
        });
        let task = async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(EngineError::from_join(err)),
            }
        }
        .boxed()
        .shared();
        *tail = task.clone();
        task
    }

    pub fn executor(&self) -> &Arc<EngineExecutor> {
        &self.executor
    }
}

/// Named lifecycle state machine.
#[derive(Clone)]
pub struct Step {
    name: Stage,
    state: Arc<AtomicU8>,
    chain: TaskChain,
    on_error: ErrorHandler,
}

impl Step {
    pub fn new(name: Stage, executor: Arc<EngineExecutor>, on_error: ErrorHandler) -> Self {
        Self {
            name,
            state: Arc::new(AtomicU8::new(StepState::Stopped as u8)),
            chain: TaskChain::new(executor),
            on_error,
        }
    }

    pub fn name(&self) -> Stage {
        self.name
    }

    pub fn state(&self) -> StepState {
        StepState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_started(&self) -> bool {
        self.state() == StepState::Started
    }

    pub fn is_started_or_starting(&self) -> bool {
        matches!(self.state(), StepState::Started | StepState::Starting)
    }

    pub fn is_stopping_or_stopped(&self) -> bool {
        matches!(self.state(), StepState::Stopped | StepState::Stopping)
    }

    /// Queue a start. `operation` runs on the engine thread once every
    /// earlier transition of this step settled.
    pub fn do_start<Op, Fut>(&self, swallow: bool, operation: Op, on_started: Option<Hook>) -> StepTask
    where
        Op: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.transition(Transition::Start, swallow, operation, on_started)
    }

    /// Queue a stop. Same ordering rules as [`Step::do_start`].
    pub fn do_stop<Op, Fut>(&self, swallow: bool, operation: Op, on_stopped: Option<Hook>) -> StepTask
    where
        Op: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.transition(Transition::Stop, swallow, operation, on_stopped)
    }

    /// Most recently queued transition of this step.
    pub fn task(&self) -> StepTask {
        self.chain
            .tail
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Force STOPPED, bypassing the queue.
    pub fn force_stopped(&self) {
        let previous = self.state.swap(StepState::Stopped as u8, Ordering::SeqCst);
        if previous != StepState::Stopped as u8 {
            debug!(step = %self.name, from = %StepState::from_u8(previous), "forced to stopped");
            observability::record_step_transition(self.name.as_str(), StepState::Stopped.as_str());
        }
    }

    fn transition<Op, Fut>(
        &self,
        direction: Transition,
        swallow: bool,
        operation: Op,
        hook: Option<Hook>,
    ) -> StepTask
    where
        Op: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let (entering, settled) = match direction {
            Transition::Start => (StepState::Starting, StepState::Started),
            Transition::Stop => (StepState::Stopping, StepState::Stopped),
        };
        let name = self.name;
        let state = self.state.clone();
        let on_error = self.on_error.clone();

        self.chain.enqueue(async move {
            state.store(entering as u8, Ordering::SeqCst);
            debug!(step = %name, state = %entering, "step transition");
            observability::record_step_transition(name.as_str(), entering.as_str());

            match operation().await {
                Ok(()) => {
                    state.store(settled as u8, Ordering::SeqCst);
                    debug!(step = %name, state = %settled, "step transition");
                    observability::record_step_transition(name.as_str(), settled.as_str());
                    if let Some(hook) = hook {
                        hook();
                    }
                    Ok(())
                }
                Err(err) => {
                    // A failed start counts as never started.
                    state.store(StepState::Stopped as u8, Ordering::SeqCst);
                    let kind = err
                        .camera_error()
                        .map(|e| e.kind.as_str())
                        .unwrap_or("defect");
                    observability::record_step_failure(name.as_str(), kind);
                    warn!(step = %name, ?direction, swallow, error = %err, "step operation failed");
                    if !swallow {
                        on_error(direction, err.clone());
                    }
                    Err(err)
                }
            }
        })
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::CameraError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct Probe {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        log: Mutex<Vec<String>>,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
                log: Mutex::new(Vec::new()),
            })
        }

        async fn run(&self, label: String, delay_ms: u64) {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.log.lock().unwrap().push(format!("{label}:begin"));
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            self.log.lock().unwrap().push(format!("{label}:end"));
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn executor() -> Arc<EngineExecutor> {
        Arc::new(EngineExecutor::new("step-test").unwrap())
    }

    fn recording_handler() -> (ErrorHandler, Arc<Mutex<Vec<(Transition, EngineError)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let handler: ErrorHandler = Arc::new(move |direction, err| {
            sink.lock().unwrap().push((direction, err));
        });
        (handler, seen)
    }

    #[tokio::test]
    async fn test_interleaved_transitions_never_overlap() {
        let (handler, _) = recording_handler();
        let step = Step::new(Stage::Engine, executor(), handler);
        let probe = Probe::new();

        let mut tasks = Vec::new();
        for i in 0..12u64 {
            let p = probe.clone();
            let label = format!("op{i}");
            let delay = (i * 7) % 5;
            let task = if i % 2 == 0 {
                step.do_start(false, move || async move { p.run(label, delay).await; Ok(()) }, None)
            } else {
                step.do_stop(false, move || async move { p.run(label, delay).await; Ok(()) }, None)
            };
            tasks.push(task);
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(probe.max_in_flight.load(Ordering::SeqCst), 1);
        let log = probe.log.lock().unwrap().clone();
        let expected: Vec<String> = (0..12)
            .flat_map(|i| [format!("op{i}:begin"), format!("op{i}:end")])
            .collect();
        assert_eq!(log, expected);
        assert_eq!(step.state(), StepState::Stopped);
    }

    #[tokio::test]
    async fn test_start_then_hook() {
        let (handler, seen) = recording_handler();
        let step = Step::new(Stage::Bind, executor(), handler);
        let hooked = Arc::new(AtomicUsize::new(0));
        let h = hooked.clone();

        step.do_start(
            false,
            || async { Ok(()) },
            Some(Box::new(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .await
        .unwrap();

        assert!(step.is_started());
        assert!(step.is_started_or_starting());
        assert_eq!(hooked.load(Ordering::SeqCst), 1);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_failed_start_is_stopped_and_reported() {
        let (handler, seen) = recording_handler();
        let step = Step::new(Stage::Preview, executor(), handler);
        let err = EngineError::stage(Stage::Preview, CameraError::failed_to_start_preview("no"));
        let returned = err.clone();

        let result = step
            .do_start(false, move || async move { Err(returned) }, None)
            .await;

        assert_eq!(result, Err(err.clone()));
        assert_eq!(step.state(), StepState::Stopped);
        assert_eq!(seen.lock().unwrap().as_slice(), &[(Transition::Start, err)]);
    }

    #[tokio::test]
    async fn test_swallowed_failure_skips_handler() {
        let (handler, seen) = recording_handler();
        let step = Step::new(Stage::Engine, executor(), handler);
        step.do_start(false, || async { Ok(()) }, None).await.unwrap();

        let result = step
            .do_stop(
                true,
                || async { Err(EngineError::stage(Stage::Engine, CameraError::unknown("x"))) },
                None,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(step.state(), StepState::Stopped);
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_queued_after_failure_still_runs() {
        let (handler, _) = recording_handler();
        let step = Step::new(Stage::Engine, executor(), handler);

        let failing = step.do_start(
            true,
            || async { Err(EngineError::stage(Stage::Engine, CameraError::unknown("x"))) },
            None,
        );
        let next = step.do_start(false, || async { Ok(()) }, None);

        assert!(failing.await.is_err());
        next.await.unwrap();
        assert!(step.is_started());
    }

    #[tokio::test]
    async fn test_state_visible_while_in_flight() {
        let (handler, _) = recording_handler();
        let step = Step::new(Stage::Engine, executor(), handler);
        let (release_tx, release_rx) = tokio::sync::oneshot::channel::<()>();

        let task = step.do_start(
            false,
            move || async move {
                let _ = release_rx.await;
                Ok(())
            },
            None,
        );

        while step.state() != StepState::Starting {
            tokio::task::yield_now().await;
        }
        assert!(step.is_started_or_starting());
        assert!(!step.is_stopping_or_stopped());

        release_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(step.is_started());

        step.force_stopped();
        assert_eq!(step.state(), StepState::Stopped);
    }

    #[tokio::test]
    async fn test_completed_task_is_ok() {
        assert_eq!(TaskChain::completed().await, Ok(()));
        let chain = TaskChain::new(executor());
        let first = chain.enqueue(async { Ok(()) });
        let second = chain.enqueue(async { Err(EngineError::Shutdown) });
        assert_eq!(first.await, Ok(()));
        assert_eq!(second.await, Err(EngineError::Shutdown));
    }
}
