//! Filesystem error types.
//!
//! Every failure carries two renderings: the `Display` text is safe to hand
//! back to a remote caller (it only mentions the path the caller supplied),
//! while [`FsError::log_message`] adds real paths and OS errors for
//! server-side logs.

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse error classification exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SandboxViolation,
    NotFound,
    AlreadyExists,
    PatchNoMatch,
    Timeout,
    InvalidArgument,
    Internal,
}

/// Filesystem error type.
#[derive(Debug, Error)]
pub enum FsError {
    /// Path, symlink target, or parent directory escapes every root.
    #[error("access denied - {reason}: {requested}")]
    SandboxViolation {
        requested: String,
        reason: &'static str,
        /// Real path that failed containment (log only).
        detail: String,
    },

    /// Path or required parent missing.
    #[error("not found: {requested}")]
    NotFound { requested: String, detail: String },

    /// Destination already exists.
    #[error("already exists: {requested}")]
    AlreadyExists { requested: String },

    /// An edit's old text matched neither exactly nor line-fuzzily.
    #[error("could not find text to replace in edit {edit_index}:\n{old_text}")]
    PatchNoMatch { edit_index: usize, old_text: String },

    /// Walk exceeded its time budget.
    #[error("operation timed out after {elapsed_ms} ms: {requested}")]
    Timeout { requested: String, elapsed_ms: u128 },

    /// Caller supplied an unusable combination of arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Unexpected I/O failure.
    #[error("operation failed: {requested}")]
    Internal {
        requested: String,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Create a SandboxViolation error.
    pub fn sandbox(
        requested: impl Into<String>,
        reason: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::SandboxViolation {
            requested: requested.into(),
            reason,
            detail: detail.into(),
        }
    }

    /// Create a NotFound error.
    pub fn not_found(requested: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            requested: requested.into(),
            detail: detail.into(),
        }
    }

    /// Create an AlreadyExists error.
    pub fn already_exists(requested: impl Into<String>) -> Self {
        Self::AlreadyExists {
            requested: requested.into(),
        }
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Classify an I/O error raised while operating on `requested`.
    pub fn io(requested: impl Into<String>, err: io::Error) -> Self {
        let requested = requested.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound {
                requested,
                detail: err.to_string(),
            },
            io::ErrorKind::AlreadyExists => Self::AlreadyExists { requested },
            _ => Self::Internal {
                requested,
                source: err,
            },
        }
    }

    /// The error's classification.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SandboxViolation { .. } => ErrorKind::SandboxViolation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PatchNoMatch { .. } => ErrorKind::PatchNoMatch,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Message safe to return to a remote caller.
    pub fn user_message(&self) -> String {
        self.to_string()
    }

    /// Message with internal detail, for server-side logs only.
    pub fn log_message(&self) -> String {
        match self {
            Self::SandboxViolation { detail, .. } | Self::NotFound { detail, .. } => {
                format!("{self} ({detail})")
            }
            Self::Internal { source, .. } => format!("{self}: {source}"),
            _ => self.to_string(),
        }
    }
}

/// Filesystem result type.
pub type FsResult<T> = Result<T, FsError>;
