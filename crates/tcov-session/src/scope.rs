//! Active and finished scopes
//!
//! An [`ActiveScope`] owns the live sessions of one test run plus the
//! ordered list of sessions already finished in it. Finishing the scope is a
//! one-way transition into an immutable [`FinishedScope`].

use crate::active::{ActiveSession, ActiveSessionDto};
use crate::signal::ChangeSignal;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tcov_model::{Count, ExecClassData, FinishedSession};
use tcov_store::Record;
use tokio::task::JoinHandle;

/// Prefix of generated scope names
pub const DEFAULT_SCOPE_NAME: &str = "New Scope";

/// Current time in UTC milliseconds
#[inline]
#[must_use]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Coverage figures attached to a scope summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScopeCoverage {
    /// Instruction counter over the whole scope
    pub count: Count,
    /// `count` as a percentage
    pub percentage: f64,
    /// Covered/total methods
    pub method_count: Count,
    /// Instruction counters per test type
    #[serde(default)]
    pub by_test_type: BTreeMap<String, Count>,
}

/// Reporting summary of a scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeSummary {
    /// Scope id
    pub id: String,
    /// Display name
    pub name: String,
    /// Start time, UTC millis
    pub started: i64,
    /// Finish time, UTC millis (0 while active)
    #[serde(default)]
    pub finished: i64,
    /// Whether this is the active scope
    pub active: bool,
    /// Whether the scope counts towards build coverage
    pub enabled: bool,
    /// Last computed coverage
    #[serde(default)]
    pub coverage: ScopeCoverage,
    /// Number of finished, non-empty sessions
    #[serde(default)]
    pub sessions_finished: usize,
}

/// Why a session could not be started
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StartRejection {
    /// Id already registered in the scope
    #[error("session with id {0} already exists")]
    DuplicateId(String),

    /// A global session is already running
    #[error("only one active global session is allowed")]
    GlobalSessionActive,

    /// The scope no longer accepts sessions
    #[error("scope is finished")]
    ScopeFinished,
}

/// The scope currently collecting probe data for a build
#[derive(Debug)]
pub struct ActiveScope {
    id: String,
    nth: u32,
    build_version: String,
    summary: RwLock<ScopeSummary>,
    sessions: DashMap<String, Arc<ActiveSession>>,
    /// Shared by session starts and finishes, exclusive for clear-all and scope finish
    gate: RwLock<()>,
    /// Serializes global-session starts
    global_start: Mutex<()>,
    finished_sessions: RwLock<Vec<Arc<FinishedSession>>>,
    finished: AtomicBool,
    changes: ChangeSignal,
}

impl ActiveScope {
    /// Create the `nth` scope of a build with the default name
    #[must_use]
    pub fn new(nth: u32, build_version: impl Into<String>) -> Self {
        Self::named(nth, format!("{DEFAULT_SCOPE_NAME} {nth}"), build_version)
    }

    /// Create the `nth` scope of a build with an explicit name
    #[must_use]
    pub fn named(nth: u32, name: impl Into<String>, build_version: impl Into<String>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let summary = ScopeSummary {
            id: id.clone(),
            name: name.into(),
            started: now_millis(),
            finished: 0,
            active: true,
            enabled: true,
            coverage: ScopeCoverage::default(),
            sessions_finished: 0,
        };
        Self {
            id,
            nth,
            build_version: build_version.into(),
            summary: RwLock::new(summary),
            sessions: DashMap::new(),
            gate: RwLock::new(()),
            global_start: Mutex::new(()),
            finished_sessions: RwLock::new(Vec::new()),
            finished: AtomicBool::new(false),
            changes: ChangeSignal::new(),
        }
    }

    /// Scope id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Ordinal of the scope within its build
    #[inline]
    #[must_use]
    pub fn nth(&self) -> u32 {
        self.nth
    }

    /// Build version
    #[inline]
    #[must_use]
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Current display name
    #[must_use]
    pub fn name(&self) -> String {
        self.summary.read().name.clone()
    }

    /// Current summary
    #[must_use]
    pub fn summary(&self) -> ScopeSummary {
        self.summary.read().clone()
    }

    /// Whether the scope was finished
    #[inline]
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Rename the scope, returning the updated summary
    pub fn rename(&self, name: impl Into<String>) -> ScopeSummary {
        self.update_summary(|s| s.name = name.into())
    }

    /// Apply an update to the summary, returning the updated summary
    pub fn update_summary(&self, update: impl FnOnce(&mut ScopeSummary)) -> ScopeSummary {
        let mut summary = self.summary.write();
        update(&mut summary);
        summary.clone()
    }

    /// Register a new live session
    ///
    /// # Errors
    /// Returns a [`StartRejection`] when the id is taken, when a second global
    /// session is requested, or when the scope is finished. Rejections are
    /// expected outcomes, not failures.
    pub fn start_session(&self, session: ActiveSession) -> Result<Arc<ActiveSession>, StartRejection> {
        let _gate = self.gate.read();
        if self.is_finished() {
            return Err(StartRejection::ScopeFinished);
        }
        let _global = session.is_global().then(|| self.global_start.lock());
        if session.is_global() && self.has_active_global_session() {
            return Err(StartRejection::GlobalSessionActive);
        }
        match self.sessions.entry(session.id().to_string()) {
            Entry::Occupied(entry) => Err(StartRejection::DuplicateId(entry.key().clone())),
            Entry::Vacant(entry) => {
                let session = Arc::new(session);
                entry.insert(Arc::clone(&session));
                tracing::info!(
                    scope = %self.id,
                    session = session.id(),
                    test_type = session.test_type(),
                    global = session.is_global(),
                    realtime = session.is_realtime(),
                    "Session started"
                );
                Ok(session)
            }
        }
    }

    /// Live session by id
    #[must_use]
    pub fn active_session(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        self.sessions.get(session_id).map(|s| Arc::clone(s.value()))
    }

    /// All live sessions
    #[must_use]
    pub fn active_sessions(&self) -> Vec<Arc<ActiveSession>> {
        self.sessions.iter().map(|s| Arc::clone(s.value())).collect()
    }

    /// Reporting views of all live sessions, ordered by id
    #[must_use]
    pub fn active_session_dtos(&self) -> Vec<ActiveSessionDto> {
        let mut dtos: Vec<_> = self.sessions.iter().map(|s| s.value().to_dto()).collect();
        dtos.sort_by(|a, b| a.id.cmp(&b.id));
        dtos
    }

    /// Whether a global session is live
    #[must_use]
    pub fn has_active_global_session(&self) -> bool {
        self.sessions.iter().any(|s| s.value().is_global())
    }

    /// Merge probe data into a live session
    ///
    /// Returns the session, or `None` if it is unknown or was finished or
    /// cancelled before the data arrived. Never waits for aggregation.
    pub fn add_probes(
        &self,
        session_id: &str,
        data: impl IntoIterator<Item = ExecClassData>,
    ) -> Option<Arc<ActiveSession>> {
        let session = self.active_session(session_id)?;
        if !session.add_all(data) {
            return None;
        }
        self.probes_changed();
        Some(session)
    }

    /// Queue a recompute of the scope coverage
    pub fn probes_changed(&self) -> bool {
        self.changes.notify()
    }

    /// Discard a live session and its data
    pub fn cancel_session(&self, session_id: &str) -> Option<Arc<ActiveSession>> {
        let (_, session) = self.sessions.remove(session_id)?;
        session.seal();
        tracing::info!(scope = %self.id, session = session_id, "Session cancelled");
        self.probes_changed();
        Some(session)
    }

    /// Discard every live session; returns the ids removed
    pub fn cancel_all_sessions(&self) -> Vec<String> {
        let _gate = self.gate.write();
        let ids = self.drain_sessions();
        if !ids.is_empty() {
            tracing::info!(scope = %self.id, count = ids.len(), "All sessions cancelled");
            self.probes_changed();
        }
        ids
    }

    /// Finish a live session
    ///
    /// Removal from the registry and freezing of its data happen under the
    /// session lock, so the result holds exactly the batches accepted before.
    /// Sessions that recorded nothing are returned but not kept.
    pub fn finish_session(&self, session_id: &str) -> Option<FinishedSession> {
        let _gate = self.gate.read();
        let (_, session) = self.sessions.remove(session_id)?;
        let finished = session.seal();
        if finished.is_empty() {
            tracing::debug!(scope = %self.id, session = session_id, "Finished session is empty, dropped");
        } else {
            self.finished_sessions.write().push(Arc::new(finished.clone()));
            let count = self.finished_sessions.read().len();
            self.update_summary(|s| s.sessions_finished = count);
            tracing::info!(
                scope = %self.id,
                session = session_id,
                hits = finished.hit_count(),
                "Session finished"
            );
        }
        Some(finished)
    }

    /// Finished sessions in finish order
    #[must_use]
    pub fn finished_sessions(&self) -> Vec<Arc<FinishedSession>> {
        self.finished_sessions.read().clone()
    }

    /// Finished sessions followed by point-in-time copies of the live ones
    #[must_use]
    pub fn snapshot(&self) -> Vec<Arc<FinishedSession>> {
        let mut sessions = self.finished_sessions();
        sessions.extend(self.sessions.iter().map(|s| Arc::new(s.value().snapshot())));
        sessions
    }

    /// Finish the scope
    ///
    /// Live sessions are cancelled and the change signal is closed. Returns
    /// `None` if the scope was already finished.
    pub fn finish(&self, enabled: bool) -> Option<FinishedScope> {
        let _gate = self.gate.write();
        if self.finished.swap(true, Ordering::AcqRel) {
            return None;
        }
        let cancelled = self.drain_sessions();
        if !cancelled.is_empty() {
            tracing::warn!(scope = %self.id, sessions = ?cancelled, "Live sessions cancelled by scope finish");
        }
        self.changes.close();

        let summary = self.update_summary(|s| {
            s.finished = now_millis();
            s.active = false;
            s.enabled = enabled;
        });
        let mut probes: BTreeMap<String, Vec<FinishedSession>> = BTreeMap::new();
        for session in self.finished_sessions.read().iter() {
            probes
                .entry(session.test_type.clone())
                .or_default()
                .push(FinishedSession::clone(session));
        }
        tracing::info!(scope = %self.id, name = %summary.name, enabled, "Scope finished");

        Some(FinishedScope {
            id: self.id.clone(),
            build_version: self.build_version.clone(),
            name: summary.name.clone(),
            summary,
            probes,
            enabled,
        })
    }

    /// Close the change signal without finishing
    pub fn close(&self) {
        self.changes.close();
    }

    /// Run `handler` on a snapshot after every coalesced change
    ///
    /// Spawns the single consumer of the change signal; returns `None` if a
    /// consumer already exists or the scope is closed. The consumer stops when
    /// the signal closes or the scope is dropped.
    pub fn subscribe_on_changes<F, Fut>(self: &Arc<Self>, handler: F) -> Option<JoinHandle<()>>
    where
        F: Fn(Arc<ActiveScope>, Vec<Arc<FinishedSession>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut rx = self.changes.subscribe()?;
        let weak: Weak<Self> = Arc::downgrade(self);
        Some(tokio::spawn(async move {
            while rx.recv().await.is_some() {
                let Some(scope) = weak.upgrade() else { break };
                let snapshot = scope.snapshot();
                handler(scope, snapshot).await;
            }
        }))
    }

    fn drain_sessions(&self) -> Vec<String> {
        let ids: Vec<String> = self.sessions.iter().map(|s| s.key().clone()).collect();
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some((id, session)) = self.sessions.remove(&id) {
                session.seal();
                removed.push(id);
            }
        }
        removed.sort();
        removed
    }
}

/// An immutable scope with its sessions grouped by test type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinishedScope {
    /// Scope id
    pub id: String,
    /// Build version
    pub build_version: String,
    /// Name at finish time
    pub name: String,
    /// Summary at finish time
    pub summary: ScopeSummary,
    /// Sessions grouped by test type; empty when loaded without data
    #[serde(default)]
    pub probes: BTreeMap<String, Vec<FinishedSession>>,
    /// Whether the scope counts towards build coverage
    pub enabled: bool,
}

impl FinishedScope {
    /// All sessions of the scope
    pub fn sessions(&self) -> impl Iterator<Item = &FinishedSession> {
        self.probes.values().flatten()
    }

    /// Copy without session data
    #[must_use]
    pub fn without_data(&self) -> Self {
        Self {
            probes: BTreeMap::new(),
            ..self.clone()
        }
    }

    /// Flip the enabled flag
    #[must_use]
    pub fn toggled(mut self) -> Self {
        self.enabled = !self.enabled;
        self.summary.enabled = self.enabled;
        self
    }
}

impl Record for FinishedScope {
    const COLLECTION: &'static str = "finished_scope";

    fn id(&self) -> String {
        self.id.clone()
    }

    fn secondary_key(&self) -> Option<String> {
        Some(self.build_version.clone())
    }
}

/// Only the enabled scopes
#[must_use]
pub fn enabled(scopes: Vec<FinishedScope>) -> Vec<FinishedScope> {
    scopes.into_iter().filter(|s| s.enabled).collect()
}

/// Summaries of scopes
#[must_use]
pub fn summaries(scopes: &[FinishedScope]) -> Vec<ScopeSummary> {
    scopes.iter().map(|s| s.summary.clone()).collect()
}
