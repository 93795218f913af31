//! Error types for tcov core
//!
//! Expected races (unknown session ids, conflicting starts) never show up
//! here; they are answered with status codes or `None`. What remains are
//! resource failures surfaced to the caller unmodified.

use crate::config::ConfigError;
use crate::sink::SinkError;
use tcov_risk::RiskError;
use tcov_store::StoreError;

/// Main tcov core error type
#[derive(Debug, thiserror::Error)]
pub enum CoverageError {
    /// Scope, session or build data could not be read or written
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),

    /// Risk ledger update failed
    #[error("risk ledger error: {0}")]
    Risk(#[from] RiskError),

    /// Report could not be delivered
    #[error("report error: {0}")]
    Report(#[from] SinkError),

    /// Payload could not be encoded or decoded
    #[error("encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Background job panicked or was aborted
    #[error("background job failed: {0}")]
    Job(String),
}

impl CoverageError {
    /// Check if repeating the operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Risk(e) => e.is_retryable(),
            Self::Report(e) => e.is_retryable(),
            Self::Encoding(_) | Self::Config(_) | Self::Job(_) => false,
        }
    }
}
