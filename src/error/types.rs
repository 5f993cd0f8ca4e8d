//! Error types
//!
//! Defines the failures raised by repository operations and by server startup.

use std::io;

use thiserror::Error;
use zip::result::ZipError;

/// Failure of a repository operation.
///
/// Every operation is terminal on failure; nothing is retried internally and
/// partial side effects are not rolled back.
#[derive(Debug, Error)]
pub enum RepoError {
    /// The requested path escapes the storage root or is otherwise refused.
    #[error("access denied: {0}")]
    AccessDenied(String),

    /// The target does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Something already occupies the requested name.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The storage medium or the output sink failed.
    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),
}

/// Status-code-free classification of a [`RepoError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    AccessDenied,
    NotFound,
    AlreadyExists,
    IoFailure,
}

impl RepoError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RepoError::AccessDenied(_) => FailureKind::AccessDenied,
            RepoError::NotFound(_) => FailureKind::NotFound,
            RepoError::AlreadyExists(_) => FailureKind::AlreadyExists,
            RepoError::Io(_) => FailureKind::IoFailure,
        }
    }

    /// True when the failure was caused by the caller's input rather than the medium.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, RepoError::Io(_))
    }
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AccessDenied => "access_denied",
            FailureKind::NotFound => "not_found",
            FailureKind::AlreadyExists => "already_exists",
            FailureKind::IoFailure => "io_failure",
        }
    }

    /// Process exit status used by the command-line driver.
    pub fn exit_code(&self) -> u8 {
        match self {
            FailureKind::AccessDenied => 3,
            FailureKind::NotFound => 4,
            FailureKind::AlreadyExists => 5,
            FailureKind::IoFailure => 1,
        }
    }
}

impl From<ZipError> for RepoError {
    fn from(error: ZipError) -> Self {
        match error {
            ZipError::Io(e) => RepoError::Io(e),
            other => RepoError::Io(io::Error::other(other)),
        }
    }
}

/// Failure while bringing the server up or running the driver.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("repository error: {0}")]
    Repository(#[from] RepoError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// Process exit status used by the command-line driver.
    pub fn exit_code(&self) -> u8 {
        match self {
            ServerError::Config(_) => 2,
            ServerError::Repository(e) => e.kind().exit_code(),
            ServerError::Io(_) => 1,
        }
    }
}
