//! Engine error types

use contracts::CameraError;
use geometry::AngleError;
use sizing::SizingError;
use thiserror::Error;

use crate::step::Stage;

/// Engine error
///
/// `Clone` because a step outcome is shared by every waiter of its future.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// A stage operation was rejected by the hardware collaborator
    #[error("{stage} stage failed: {source}")]
    StageFailed {
        stage: Stage,
        #[source]
        source: CameraError,
    },

    /// Failure reported by the collaborator outside any stage operation
    #[error("hardware error: {0}")]
    Hardware(#[source] CameraError),

    /// Size negotiation misuse (fabricated or missing sizes)
    #[error(transparent)]
    Sizing(#[from] SizingError),

    /// Unsanitized orientation input
    #[error(transparent)]
    Angles(#[from] AngleError),

    /// Stage started before the stage it depends on
    #[error("{stage} stage requires {requires} to be started")]
    DependencyOrder { stage: Stage, requires: Stage },

    /// Engine executor could not be created
    #[error("engine executor error: {0}")]
    Executor(String),

    /// Engine was destroyed before the operation ran
    #[error("engine has been shut down")]
    Shutdown,

    /// Operation task panicked or was aborted
    #[error("engine task aborted: {0}")]
    Aborted(String),
}

impl EngineError {
    pub fn stage(stage: Stage, source: CameraError) -> Self {
        Self::StageFailed { stage, source }
    }

    /// The tagged camera failure, if this is one.
    pub fn camera_error(&self) -> Option<&CameraError> {
        match self {
            Self::StageFailed { source, .. } => Some(source),
            Self::Hardware(source) => Some(source),
            _ => None,
        }
    }

    /// Programming or configuration defects. Never retried.
    pub fn is_defect(&self) -> bool {
        matches!(
            self,
            Self::Sizing(_) | Self::Angles(_) | Self::DependencyOrder { .. } | Self::Aborted(_)
        )
    }

    pub(crate) fn from_join(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Self::Shutdown
        } else {
            Self::Aborted(err.to_string())
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, EngineError>;
