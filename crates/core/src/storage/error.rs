use thiserror::Error;

/// Coarse classification of a [`StoreError`].
///
/// Lets callers of a caching decorator tell "nothing happened" apart from
/// "the write landed but the fast path is stale" without matching on every
/// variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The backing store rejected or failed the operation. Nothing changed.
    SourceWriteFailed,
    /// The source write succeeded but the mirror could not be updated.
    MirrorDesync,
    /// The mirror is not usable until a new cache fill is triggered.
    CacheUnavailable,
}

/// Errors that can occur during collection operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Write rejected: {0}")]
    WriteRejected(String),
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Mirror out of sync after {operation} of {key}: {reason}")]
    MirrorDesync {
        operation: &'static str,
        key: String,
        reason: String,
    },
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl StoreError {
    /// Builds a [`StoreError::MirrorDesync`] for a write whose source half
    /// already committed.
    pub fn mirror_desync(
        operation: &'static str,
        key: impl ToString,
        cause: &StoreError,
    ) -> Self {
        Self::MirrorDesync {
            operation,
            key: key.to_string(),
            reason: cause.to_string(),
        }
    }

    /// Wraps any failure into [`StoreError::CacheUnavailable`], keeping an
    /// existing `CacheUnavailable` as is.
    pub fn into_unavailable(self) -> Self {
        match self {
            err @ Self::CacheUnavailable(_) => err,
            other => Self::CacheUnavailable(other.to_string()),
        }
    }

    /// Returns the coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MirrorDesync { .. } => ErrorKind::MirrorDesync,
            Self::CacheUnavailable(_) => ErrorKind::CacheUnavailable,
            _ => ErrorKind::SourceWriteFailed,
        }
    }
}

/// Result type for collection operations.
pub type Result<T> = std::result::Result<T, StoreError>;
