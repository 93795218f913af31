//! Actions, agent messages and their results
//!
//! Both directions are closed enums dispatched exhaustively by
//! [`crate::AgentState`]. JSON is the only encoding handled here.

use crate::error::CoverageError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tcov_counter::ClassMetadata;
use tcov_model::ExecClassData;

/// HTTP-like result codes
pub mod status {
    /// Accepted
    pub const OK: u16 = 200;
    /// Malformed or unsupported request
    pub const BAD_REQUEST: u16 = 400;
    /// Unknown session or scope
    pub const NOT_FOUND: u16 = 404;
    /// Conflicting session start
    pub const CONFLICT: u16 = 409;
}

/// Payload of [`Action::StartNewSession`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StartPayload {
    /// Requested id; empty for a generated one
    pub session_id: String,
    /// Test type
    pub test_type: String,
    /// Test name for unattributed hits
    pub test_name: String,
    /// Collect for every test on the agent
    pub is_global: bool,
    /// Recompute coverage while running
    pub is_realtime: bool,
}

/// Payload of [`Action::SwitchActiveScope`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActiveScopeChangePayload {
    /// Name of the new scope; empty for a generated one
    pub scope_name: String,
    /// Keep the finished scope
    pub save_prev_scope: bool,
    /// Whether the kept scope counts towards build coverage
    pub prev_scope_enabled: bool,
}

/// Payload of [`Action::RenameScope`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameScopePayload {
    /// Scope to rename
    pub scope_id: String,
    /// New name
    pub scope_name: String,
}

/// Payload addressing a scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopePayload {
    /// Scope id
    pub scope_id: String,
}

/// Payload addressing a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// Session id
    pub session_id: String,
}

/// Payload of [`Action::AddCoverage`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverPayload {
    /// Target session
    pub session_id: String,
    /// Exec data to merge
    pub data: Vec<ExecClassData>,
}

/// Payload addressing a build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildPayload {
    /// Build version
    pub version: String,
}

/// Requests handled by [`crate::AgentState::do_action`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    /// Make the current build the baseline, or undo that
    ToggleBaseline,
    /// Finish the active scope and open a new one
    SwitchActiveScope(ActiveScopeChangePayload),
    /// Rename the active or a finished scope
    RenameScope(RenameScopePayload),
    /// Include or exclude a finished scope from build coverage
    ToggleScope(ScopePayload),
    /// Delete a finished scope
    DropScope(ScopePayload),
    /// Delete the data of another build
    RemoveBuild(BuildPayload),
    /// Start a test session
    StartNewSession(StartPayload),
    /// Merge exec data into a live session
    AddCoverage(CoverPayload),
    /// Discard a live session
    CancelSession(SessionPayload),
    /// Discard every live session
    CancelAllSessions,
    /// Ask the agent to stop a session
    StopSession(SessionPayload),
    /// Ask the agent to stop every session
    StopAllSessions,
    /// Export coverage of a build
    ExportCoverage(BuildPayload),
}

impl Action {
    /// Decode an action
    ///
    /// # Errors
    /// Returns [`CoverageError::Encoding`] for malformed JSON.
    pub fn parse(raw: &str) -> Result<Self, CoverageError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Session start forwarded to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartSessionPayload {
    /// Session id
    pub session_id: String,
    /// Test type
    pub test_type: String,
    /// Test name
    pub test_name: String,
    /// Global session
    pub is_global: bool,
    /// Realtime session
    pub is_realtime: bool,
}

/// Scope switch forwarded to the agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitScopePayload {
    /// New scope id
    pub id: String,
    /// New scope name
    pub name: String,
    /// Finished scope id
    pub prev_id: String,
}

/// Commands for the agent, carried in [`ActionResult::data`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentCommand {
    /// Start collecting for a session
    StartAgentSession(StartSessionPayload),
    /// Drop a session
    CancelAgentSession(SessionPayload),
    /// Drop every session
    CancelAllAgentSessions,
    /// Flush and finish a session
    StopAgentSession(SessionPayload),
    /// Flush and finish every session
    StopAllAgentSessions,
    /// Switch to a new scope
    InitActiveScope(InitScopePayload),
}

/// Field-level validation error
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// Offending field
    pub field: String,
    /// What is wrong
    pub message: String,
}

/// Result of an action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Status code, see [`status`]
    pub code: u16,
    /// Result data
    pub data: Value,
}

impl ActionResult {
    /// Result with code and data
    #[must_use]
    pub fn new(code: u16, data: impl Into<Value>) -> Self {
        Self {
            code,
            data: data.into(),
        }
    }

    /// `200` with data
    #[must_use]
    pub fn ok(data: impl Into<Value>) -> Self {
        Self::new(status::OK, data)
    }

    /// `404` for a session that is not live
    #[must_use]
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(status::NOT_FOUND, format!("Active session '{session_id}' not found."))
    }

    /// `200` carrying a command for the agent
    ///
    /// # Errors
    /// Returns [`CoverageError::Encoding`] if the command cannot be encoded.
    pub fn command(command: &AgentCommand) -> Result<Self, CoverageError> {
        Ok(Self::ok(serde_json::to_value(command)?))
    }

    /// A field error with `code`
    ///
    /// # Errors
    /// Returns [`CoverageError::Encoding`] if the error cannot be encoded.
    pub fn field_error(code: u16, field: &str, message: &str) -> Result<Self, CoverageError> {
        let error = FieldError {
            field: field.to_string(),
            message: message.to_string(),
        };
        Ok(Self::new(code, serde_json::to_value(error)?))
    }

    /// Whether the code is `200`
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.code == status::OK
    }
}

/// Messages sent by the agent, handled by [`crate::AgentState::process_message`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CoverMessage {
    /// Agent starts sending class metadata
    InitInfo {
        /// Classes announced
        classes_count: usize,
        /// Free-form message
        #[serde(default)]
        message: String,
        /// Discard metadata received so far
        #[serde(default)]
        init: bool,
    },
    /// A batch of class metadata
    InitDataPart {
        /// Classes of the batch
        classes: Vec<ClassMetadata>,
    },
    /// All class metadata was sent
    Initialized {
        /// Free-form message
        #[serde(default)]
        msg: String,
    },
    /// Agent switched scope
    ScopeInitialized {
        /// New scope id
        id: String,
        /// New scope name
        name: String,
        /// Previous scope id
        prev_id: String,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Agent started a session
    SessionStarted {
        /// Session id
        session_id: String,
        /// Test type
        test_type: String,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Agent dropped a session
    SessionCancelled {
        /// Session id
        session_id: String,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Agent dropped several sessions
    SessionsCancelled {
        /// Session ids
        ids: Vec<String>,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Exec data of a session
    CoverDataPart {
        /// Session id
        session_id: String,
        /// Exec data
        data: Vec<ExecClassData>,
    },
    /// Probes of a session changed
    SessionChanged {
        /// Session id
        session_id: String,
        /// Probes hit so far
        #[serde(default)]
        probe_count: usize,
    },
    /// Agent finished a session
    SessionFinished {
        /// Session id
        session_id: String,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Agent finished several sessions
    SessionsFinished {
        /// Session ids
        ids: Vec<String>,
        /// Agent time, millis
        #[serde(default)]
        ts: i64,
    },
    /// Sessions the agent still runs
    SessionsState {
        /// Session ids
        ids: Vec<String>,
    },
}

impl CoverMessage {
    /// Decode a message
    ///
    /// # Errors
    /// Returns [`CoverageError::Encoding`] for malformed JSON.
    pub fn parse(raw: &str) -> Result<Self, CoverageError> {
        Ok(serde_json::from_str(raw)?)
    }
}
