//! Sizing error types

use contracts::Size;
use thiserror::Error;

/// Selector misuse. Both variants are configuration defects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SizingError {
    /// A selector returned a size that was not among its input
    #[error("selector '{selector}' fabricated size {size} not present in its input")]
    Fabricated { selector: String, size: Size },

    /// Nothing left to choose from
    #[error("selector '{selector}' selected nothing from {available} candidates")]
    NoCandidates { selector: String, available: usize },
}

pub type Result<T> = std::result::Result<T, SizingError>;
