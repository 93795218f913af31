//! tcov Session
//!
//! Concurrency-safe lifecycle for collecting raw probe data.
//!
//! # Core Concepts
//!
//! - [`ActiveSession`]: probe data of one running test session, merged under a per-session lock
//! - [`ActiveScope`]: registry of live sessions plus the sessions already finished in the scope
//! - [`ChangeSignal`]: single-slot notification drained by one background consumer
//! - [`FinishedScope`] / [`ScopeManager`]: immutable scopes and their persistence
//!
//! # Lifecycle
//!
//! ```text
//! Session: ACTIVE --finish--> FINISHED
//!          ACTIVE --cancel--> CANCELLED
//! Scope:   ACTIVE --finish--> FINISHED
//! ```
//!
//! # Example
//!
//! ```rust
//! use tcov_model::{ExecClassData, Probes};
//! use tcov_session::{ActiveScope, ActiveSession};
//!
//! let scope = ActiveScope::new(1, "1.0.0");
//! scope.start_session(ActiveSession::new("s1", "AUTO", "")).unwrap();
//! scope.add_probes("s1", [ExecClassData::new("com/acme/Foo", Probes::from_bools(&[true]))]);
//!
//! let finished = scope.finish_session("s1").unwrap();
//! assert_eq!(finished.hit_count(), 1);
//! ```

#![warn(unreachable_pub)]

mod active;
mod manager;
mod scope;
mod signal;

// Re-exports
pub use active::{ActiveSession, ActiveSessionDto, ActiveSessions};
pub use manager::{ScopeManager, StoredSession};
pub use scope::{
    enabled, now_millis, summaries, ActiveScope, FinishedScope, ScopeCoverage, ScopeSummary,
    StartRejection, DEFAULT_SCOPE_NAME,
};
pub use signal::ChangeSignal;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for session handling
    pub use crate::{
        ActiveScope, ActiveSession, FinishedScope, ScopeManager, ScopeSummary, StartRejection,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
