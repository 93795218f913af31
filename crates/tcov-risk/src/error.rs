//! Error types for the risk ledger

use tcov_store::StoreError;

/// Risk ledger errors
#[derive(Debug, thiserror::Error)]
pub enum RiskError {
    /// Ledger could not be loaded or stored
    #[error("risk ledger storage failed for baseline {baseline}: {source}")]
    Storage {
        /// Baseline whose ledger was accessed
        baseline: String,
        /// Store failure
        #[source]
        source: StoreError,
    },
}

impl RiskError {
    /// Wrap a store failure for a baseline
    #[inline]
    pub fn storage(baseline: impl Into<String>, source: StoreError) -> Self {
        Self::Storage {
            baseline: baseline.into(),
            source,
        }
    }

    /// Check if repeating the call may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage { source, .. } => source.is_retryable(),
        }
    }
}
