use cask_types::Locator;

/// Errors from block store and metadata operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested block or collection was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored bytes no longer match their locator (data corruption).
    #[error("hash mismatch for {locator}: computed {computed}")]
    HashMismatch { locator: Locator, computed: Locator },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
