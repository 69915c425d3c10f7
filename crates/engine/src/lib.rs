//! # Engine
//!
//! Camera session orchestration.
//!
//! - [`CameraEngine`]: ENGINE -> BIND -> PREVIEW lifecycle over a [`CameraSession`]
//! - [`Step`]: serialized start/stop state machine per stage
//! - [`EngineExecutor`]: dedicated engine thread all mutations run on
//! - [`MockSession`]: in-process session for tests and dry runs

pub mod engine;
pub mod error;
pub mod executor;
pub mod listener;
pub mod mock_session;
pub mod options;
pub mod session;
pub mod step;

pub use engine::{CameraEngine, EngineState};
pub use error::{EngineError, Result};
pub use executor::EngineExecutor;
pub use listener::{EngineEvent, EngineListener, NoopListener};
pub use mock_session::{InjectedFailure, MockCall, MockConfig, MockOperation, MockSession};
pub use options::EngineOptions;
pub use session::{CameraSession, SessionResult};
pub use step::{ErrorHandler, Hook, Stage, Step, StepState, StepTask, TaskChain, Transition};
