//! Layered error definitions
//!
//! `ContractError` covers config and io failures. `CameraError` is the tagged
//! failure a hardware collaborator reports back to the engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified config / io error type
#[derive(Debug, Error)]
pub enum ContractError {
    // ===== Configuration Errors =====
    /// Configuration parse error
    #[error("config parse error: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration validation error
    #[error("config validation error at '{field}': {message}")]
    ConfigValidation { field: String, message: String },

    // ===== General Errors =====
    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl ContractError {
    /// Create configuration parse error
    pub fn config_parse(message: impl Into<String>) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: None,
        }
    }

    /// Create configuration parse error with its underlying cause
    pub fn config_parse_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ConfigParse {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create configuration validation error
    pub fn config_validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Reason attached to a [`CameraError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unknown,
    /// The device could not be opened (busy, permission, bad id).
    FailedToConnect,
    /// The device opened but refused to stream.
    FailedToStartPreview,
    /// The device went away after opening. Recoverable by a restart.
    Disconnected,
    /// No camera with the requested facing exists.
    NoCamera,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::FailedToConnect => "failed_to_connect",
            Self::FailedToStartPreview => "failed_to_start_preview",
            Self::Disconnected => "disconnected",
            Self::NoCamera => "no_camera",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tagged failure raised by a hardware collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("camera error ({kind}): {message}")]
pub struct CameraError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CameraError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unknown(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, message)
    }

    pub fn failed_to_connect(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedToConnect, message)
    }

    pub fn failed_to_start_preview(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::FailedToStartPreview, message)
    }

    pub fn disconnected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Disconnected, message)
    }

    pub fn no_camera(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NoCamera, message)
    }

    /// Transient failures are answered with one automatic restart.
    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Disconnected
    }
}
