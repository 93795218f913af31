//! tcov Risk
//!
//! Cross-build ledger of risk methods: methods new or modified relative to
//! a baseline build, and whether tests have exercised them since.
//!
//! # Core Concepts
//!
//! - [`BaselineRisks`]: the persisted ledger of one baseline
//! - [`Risk`]: a method with its best coverage and per-build [`RiskStatus`]
//! - [`RiskLedger`]: load, fold in a build, store; one write per update
//! - [`not_covered`] / [`RiskCounts`]: queries over [`TypedRisks`]
//!
//! # Coverage Is Monotonic
//!
//! A risk's stored coverage only moves up: every update keeps the higher of
//! the stored and the current counter.

#![warn(unreachable_pub)]

mod error;
mod ledger;

// Re-exports
pub use error::RiskError;
pub use ledger::{
    not_covered, BaselineRisks, Risk, RiskCounts, RiskLedger, RiskStatus, RiskType, TypedRisks,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for risk handling
    pub use crate::{BaselineRisks, Risk, RiskError, RiskLedger, RiskStatus, RiskType, TypedRisks};
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
