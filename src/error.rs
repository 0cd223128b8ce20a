//! Request-level errors.
//!
//! Only failures that prevent establishing the scope of a request live here.
//! Problems with individual files are recorded as [`SkipReason`] values on the
//! file descriptor and never surface as errors.
//!
//! [`SkipReason`]: crate::content::SkipReason

use std::path::PathBuf;
use thiserror::Error;

/// Fatal error terminating one extraction request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    /// Neither a root directory nor any external file was given.
    #[error("Provide a project directory or at least one external file.")]
    MissingScope,

    /// The root path does not exist.
    #[error("Invalid directory path: '{}' does not exist.", .0.display())]
    RootNotFound(PathBuf),

    /// The root path exists but is not a directory.
    #[error("Invalid directory path: '{}' is not a directory.", .0.display())]
    RootNotDirectory(PathBuf),

    /// The blocking extraction task panicked or was aborted by the runtime.
    #[error("An unexpected error occurred: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ExtractionError>;
