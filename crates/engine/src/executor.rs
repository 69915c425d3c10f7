//! Single-threaded engine executor
//!
//! One dedicated OS thread drives a current-thread tokio runtime. Every
//! engine-owned mutation runs as a task on it, so those tasks never run in
//! parallel with each other.

use std::future::Future;
use std::io;
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};

use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Caller-owned engine thread.
pub struct EngineExecutor {
    name: String,
    handle: Handle,
    thread_id: ThreadId,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl EngineExecutor {
    /// Spawn the engine thread.
    pub fn new(name: impl Into<String>) -> io::Result<Self> {
        let name = name.into();
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let thread_name = name.clone();
        let thread = thread::Builder::new().name(name.clone()).spawn(move || {
            debug!(executor = %thread_name, "engine thread started");
            runtime.block_on(async {
                let _ = shutdown_rx.await;
            });
            // Dropping the runtime cancels whatever is still queued.
            drop(runtime);
            debug!(executor = %thread_name, "engine thread stopped");
        })?;

        Ok(Self {
            name,
            handle,
            thread_id: thread.thread().id(),
            shutdown_tx: Mutex::new(Some(shutdown_tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run `future` on the engine thread.
    ///
    /// After shutdown the returned handle resolves to a cancelled error.
    pub fn spawn<F>(&self, future: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle.spawn(future)
    }

    pub fn is_engine_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Signal the engine thread to stop. Idempotent, never blocks.
    pub fn shutdown(&self) {
        let sender = self
            .shutdown_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sender) = sender {
            debug!(executor = %self.name, "shutting down engine executor");
            let _ = sender.send(());
        }
    }

    /// Wait for the engine thread to exit. No-op on the engine thread itself.
    pub fn join(&self) {
        if self.is_engine_thread() {
            warn!(executor = %self.name, "join requested from the engine thread, skipping");
            return;
        }
        let thread = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                warn!(executor = %self.name, "engine thread panicked");
            }
        }
    }
}

impl Drop for EngineExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for EngineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineExecutor")
            .field("name", &self.name)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
