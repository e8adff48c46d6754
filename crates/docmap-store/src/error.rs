use docmap_types::{Revision, TypeError};

/// Errors from storage backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested document does not exist.
    #[error("document not found: {0}")]
    NotFound(String),

    /// A revision precondition failed.
    #[error("revision conflict on {key}: expected {expected:?}, stored {actual:?}")]
    Conflict {
        key: String,
        expected: Option<Revision>,
        actual: Option<Revision>,
    },

    /// The named view has not been installed.
    #[error("unknown view: {0}")]
    UnknownView(String),

    /// The backend does not implement the operation.
    #[error("operation not supported by {backend} backend: {operation}")]
    Unsupported {
        backend: &'static str,
        operation: &'static str,
    },

    /// Storage backend is read-only.
    #[error("store is read-only")]
    ReadOnly,

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A stored document could not be decoded.
    #[error("malformed document: {0}")]
    Malformed(#[from] TypeError),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
