//! Error types shared by the grants crates

use thiserror::Error;

use crate::markup::MarkupError;

/// Common error type
#[derive(Error, Debug)]
pub enum CommonError {
    /// Markup could not be scanned
    #[error(transparent)]
    Markup(#[from] MarkupError),

    /// IO error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for the common utilities
pub type CommonResult<T> = Result<T, CommonError>;
