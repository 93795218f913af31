//! Error types for record persistence

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by store backends
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend I/O failure
    #[error("store i/o failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded
    #[error("record encoding failed: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Persisted data does not have the expected shape
    #[error("corrupted record {collection}/{id}: {reason}")]
    Corrupted {
        /// Collection of the record
        collection: String,
        /// Record id
        id: String,
        /// What was wrong
        reason: String,
    },

    /// Backend refused or could not serve the request
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Check if the failed call may succeed when repeated
    ///
    /// Stores never retry on their own; the caller decides.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }

    /// Create corruption error
    #[inline]
    pub fn corrupted(
        collection: impl Into<String>,
        id: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Corrupted {
            collection: collection.into(),
            id: id.into(),
            reason: reason.into(),
        }
    }
}
