//! Error types for the data-sink layer.

use crate::handle::SinkHandle;
use thiserror::Error;
use wdm_types::{DataVersion, ValueKind};

/// Result type for data-sink operations.
pub type SinkResult<T> = Result<T, SinkError>;

/// Errors that can occur in data-sink operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The store has been shut down and no longer has a backend.
    #[error("no backend: data sink has been shut down")]
    NoBackend,

    /// The backend does not know this handle, or it was released.
    #[error("stale or unknown data sink handle {0}")]
    InvalidHandle(SinkHandle),

    /// The owning client has been closed.
    #[error("client is closed")]
    ClientClosed,

    /// The backend rejected the path.
    #[error("invalid property path: {0:?}")]
    InvalidPath(String),

    /// Nothing is stored at the path.
    #[error("path not found: {0}")]
    PathNotFound(String),

    /// The stored value has a different type than requested.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: ValueKind,
        found: ValueKind,
    },

    /// A conditional write's precondition no longer held at flush time.
    #[error("conditional update rejected at {path}: staged against {staged}, current is {current}")]
    ConditionalUpdateRejected {
        path: String,
        staged: DataVersion,
        current: DataVersion,
    },

    /// Error reported by the backend.
    #[error("backend error: {0}")]
    Backend(String),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(String),

    /// Error from the value types.
    #[error(transparent)]
    Types(#[from] wdm_types::Error),
}

impl SinkError {
    /// Returns true if the error means the store's handle is unusable,
    /// either because it was shut down locally or released by the backend.
    #[must_use]
    pub fn is_invalid_handle(&self) -> bool {
        matches!(self, Self::NoBackend | Self::InvalidHandle(_))
    }
}
