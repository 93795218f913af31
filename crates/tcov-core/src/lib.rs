//! tcov Core
//!
//! Coverage summaries and the orchestration of one agent's build: incoming
//! actions and agent messages, background recompute of scope coverage,
//! build coverage with risks, and delivery of the resulting reports.
//!
//! # Core Concepts
//!
//! - [`AgentState`]: active scope, coverage context and collaborators of one build
//! - [`CoverContext`]: class metadata of the build diffed against its parent
//! - [`Action`] / [`CoverMessage`]: closed request and event sets
//! - [`ReportSink`] / [`Reporter`]: transport-agnostic report delivery
//! - [`FanOut`]: bounded pool for independent sub-reports
//! - [`summary`]: pure folds producing the reported values
//!
//! # Example
//!
//! ```rust
//! use tcov_core::{Action, AgentState, MemorySink, StartPayload, TcovConfig};
//! use tcov_store::{MemoryStore, StoreClient};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tcov_core::CoverageError> {
//! let sink = MemorySink::new();
//! let state = AgentState::new(
//!     "petclinic",
//!     "1.0.0",
//!     StoreClient::new(MemoryStore::new()),
//!     sink.clone(),
//!     TcovConfig::default(),
//! );
//!
//! let result = state
//!     .do_action(Action::StartNewSession(StartPayload {
//!         session_id: "s1".into(),
//!         test_type: "AUTO".into(),
//!         ..StartPayload::default()
//!     }))
//!     .await?;
//! assert!(result.is_ok());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

mod agent;
mod config;
mod context;
mod error;
mod fanout;
mod protocol;
mod sink;
pub mod summary;
pub mod telemetry;

// Re-exports
pub use agent::AgentState;
pub use config::{ConfigError, LogFormat, TcovConfig};
pub use context::{Baseline, CoverContext, GlobalAgentData, StoredBuild};
pub use error::CoverageError;
pub use fanout::FanOut;
pub use protocol::{
    status, Action, ActionResult, ActiveScopeChangePayload, AgentCommand, BuildPayload, CoverMessage,
    CoverPayload, FieldError, InitScopePayload, RenameScopePayload, ScopePayload, SessionPayload,
    StartPayload, StartSessionPayload,
};
pub use sink::{MemorySink, Report, ReportSink, Reporter, Route, SinkError, Target};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for embedding tcov
    pub use crate::{
        Action, ActionResult, AgentState, CoverMessage, CoverageError, ReportSink, Route, TcovConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
