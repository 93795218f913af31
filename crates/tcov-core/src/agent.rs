//! Agent state
//!
//! [`AgentState`] owns everything tcov keeps for one agent running one build:
//! the active scope, the coverage context built from the agent's class
//! metadata, and handles to the scope store, the risk ledger and the report
//! sink. Requests arrive as [`Action`]s, agent events as [`CoverMessage`]s.

mod coverage;

use crate::config::TcovConfig;
use crate::context::{Baseline, BuildData, CoverContext, GlobalAgentData, StoredBuild};
use crate::error::CoverageError;
use crate::fanout::FanOut;
use crate::protocol::{
    status, Action, ActionResult, ActiveScopeChangePayload, AgentCommand, CoverMessage, InitScopePayload,
    SessionPayload, StartPayload, StartSessionPayload,
};
use crate::sink::{ReportSink, Reporter, Route};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use tcov_counter::{ClassMetadata, ClassRegistry};
use tcov_model::FinishedSession;
use tcov_risk::RiskLedger;
use tcov_session::{ActiveScope, ActiveSession, FinishedScope, ScopeManager, StartRejection};
use tcov_store::StoreClient;
use tokio::task::JoinHandle;

const GLOBAL_SESSION_CONFLICT: &str =
    "Error! Only one active global session is allowed. Please finish the active one in order to start new.";
const DUPLICATE_SESSION: &str = "Session with such ID already exists. Please choose a different ID.";

/// Coverage state of one agent and build
pub struct AgentState {
    agent_id: String,
    build_version: String,
    config: TcovConfig,
    client: StoreClient,
    scopes: ScopeManager,
    ledger: RiskLedger,
    reporter: Reporter,
    fan_out: FanOut,
    active_scope: RwLock<Arc<ActiveScope>>,
    scope_nth: AtomicU32,
    data: Mutex<BuildData>,
    pending: Mutex<Pending>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    this: Weak<AgentState>,
}

/// Finished data whose first write failed, written again before the next change
#[derive(Debug, Default)]
struct Pending {
    sessions: Vec<(String, FinishedSession)>,
    scopes: Vec<FinishedScope>,
}

impl std::fmt::Debug for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentState")
            .field("agent_id", &self.agent_id)
            .field("build_version", &self.build_version)
            .field("active_scope", &self.active_scope().id())
            .finish_non_exhaustive()
    }
}

impl AgentState {
    /// Create state for an agent build
    ///
    /// The first scope is opened immediately; coverage is computed once the
    /// class metadata has been received or restored.
    #[must_use]
    pub fn new(
        agent_id: impl Into<String>,
        build_version: impl Into<String>,
        client: StoreClient,
        sink: Arc<dyn ReportSink>,
        config: TcovConfig,
    ) -> Arc<Self> {
        let build_version = build_version.into();
        let first = ActiveScope::named(1, format!("{} 1", config.default_scope_name), build_version.as_str());
        Arc::new_cyclic(|this| Self {
            agent_id: agent_id.into(),
            reporter: Reporter::new(&build_version, sink),
            fan_out: FanOut::new(config.fan_out_workers),
            scopes: ScopeManager::new(client.clone()),
            ledger: RiskLedger::new(client.clone()),
            client,
            active_scope: RwLock::new(Arc::new(first)),
            scope_nth: AtomicU32::new(1),
            data: Mutex::new(BuildData::NoData),
            pending: Mutex::new(Pending::default()),
            consumer: Mutex::new(None),
            this: this.clone(),
            build_version,
            config,
        })
    }

    /// Agent id
    #[inline]
    #[must_use]
    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Build version
    #[inline]
    #[must_use]
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TcovConfig {
        &self.config
    }

    /// Scope persistence
    #[inline]
    #[must_use]
    pub fn scope_manager(&self) -> &ScopeManager {
        &self.scopes
    }

    /// The scope currently collecting data
    #[must_use]
    pub fn active_scope(&self) -> Arc<ActiveScope> {
        Arc::clone(&self.active_scope.read())
    }

    /// Coverage context, once class metadata is available
    #[must_use]
    pub fn context(&self) -> Option<Arc<CoverContext>> {
        match &*self.data.lock() {
            BuildData::Ready(context) => Some(Arc::clone(context)),
            _ => None,
        }
    }

    /// Restore the coverage context of a build seen before
    ///
    /// Returns `false` if no class metadata was stored for the build.
    ///
    /// # Errors
    /// Returns [`CoverageError`] if loading, computing or reporting fails.
    pub async fn initialize(&self) -> Result<bool, CoverageError> {
        let Some(build) = self.client.find_by_id::<StoredBuild>(&self.build_version).await? else {
            tracing::debug!(agent = %self.agent_id, build = %self.build_version, "No stored build data");
            return Ok(false);
        };
        let context = self.build_context(build).await?;
        self.set_ready(Arc::clone(&context));
        self.process_initialized(&context).await?;
        Ok(true)
    }

    /// Decode and handle an action
    ///
    /// Undecodable actions are answered with `400`.
    ///
    /// # Errors
    /// See [`do_action`](Self::do_action).
    pub async fn do_raw_action(&self, raw: &str) -> Result<ActionResult, CoverageError> {
        match Action::parse(raw) {
            Ok(action) => self.do_action(action).await,
            Err(error) => {
                tracing::warn!(agent = %self.agent_id, %error, "Invalid action");
                Ok(ActionResult::new(status::BAD_REQUEST, format!("Invalid action: {error}")))
            }
        }
    }

    /// Handle an action
    ///
    /// Unknown sessions and scopes, conflicts and unsupported actions are
    /// answered with a status code.
    ///
    /// # Errors
    /// Returns [`CoverageError`] if storing, computing or reporting fails.
    pub async fn do_action(&self, action: Action) -> Result<ActionResult, CoverageError> {
        match action {
            Action::ToggleBaseline => self.toggle_baseline().await,
            Action::SwitchActiveScope(payload) => self.change_active_scope(payload).await,
            Action::RenameScope(payload) => self.rename_scope(&payload.scope_id, &payload.scope_name).await,
            Action::ToggleScope(payload) => self.toggle_scope(&payload.scope_id).await,
            Action::DropScope(payload) => self.drop_scope(&payload.scope_id).await,
            Action::RemoveBuild(payload) => self.remove_build(&payload.version).await,
            Action::StartNewSession(payload) => self.start_session(payload).await,
            Action::AddCoverage(payload) => Ok(
                match self.active_scope().add_probes(&payload.session_id, payload.data) {
                    Some(_) => ActionResult::ok(""),
                    None => ActionResult::session_not_found(&payload.session_id),
                },
            ),
            Action::CancelSession(payload) => match self.active_scope().cancel_session(&payload.session_id) {
                Some(session) => {
                    self.send_active_sessions().await?;
                    ActionResult::command(&AgentCommand::CancelAgentSession(SessionPayload {
                        session_id: session.id().to_string(),
                    }))
                }
                None => Ok(ActionResult::session_not_found(&payload.session_id)),
            },
            Action::CancelAllSessions => {
                self.active_scope().cancel_all_sessions();
                self.send_active_sessions().await?;
                ActionResult::command(&AgentCommand::CancelAllAgentSessions)
            }
            Action::StopSession(payload) => match self.active_scope().active_session(&payload.session_id) {
                Some(session) => ActionResult::command(&AgentCommand::StopAgentSession(SessionPayload {
                    session_id: session.id().to_string(),
                })),
                None => Ok(ActionResult::session_not_found(&payload.session_id)),
            },
            Action::StopAllSessions => ActionResult::command(&AgentCommand::StopAllAgentSessions),
            Action::ExportCoverage(_) => Ok(unsupported("EXPORT_COVERAGE")),
        }
    }

    /// Decode and handle an agent message
    ///
    /// # Errors
    /// Returns [`CoverageError::Encoding`] for malformed messages, otherwise
    /// see [`process_message`](Self::process_message).
    pub async fn process_raw_message(&self, raw: &str) -> Result<(), CoverageError> {
        self.process_message(CoverMessage::parse(raw)?).await
    }

    /// Handle an agent message
    ///
    /// Messages about sessions that are no longer live are logged and dropped.
    ///
    /// # Errors
    /// Returns [`CoverageError`] if storing, computing or reporting fails.
    pub async fn process_message(&self, message: CoverMessage) -> Result<(), CoverageError> {
        let agent = self.agent_id.as_str();
        match message {
            CoverMessage::InitInfo {
                classes_count,
                message,
                init,
            } => {
                self.begin_class_data(init, classes_count);
                tracing::info!(agent, classes_count, %message, "Agent initializing");
            }
            CoverMessage::InitDataPart { classes } => self.add_class_data(classes),
            CoverMessage::Initialized { .. } => self.initialized().await?,
            CoverMessage::ScopeInitialized { id, name, prev_id, .. } => {
                tracing::info!(agent, scope = %id, %name, prev = %prev_id, "Agent switched scope");
                self.send_active_scope().await?;
                self.send_active_sessions().await?;
            }
            CoverMessage::SessionStarted {
                session_id, test_type, ..
            } => {
                tracing::info!(agent, session = %session_id, %test_type, "Agent session started");
            }
            CoverMessage::SessionCancelled { session_id, .. } => {
                tracing::info!(agent, session = %session_id, "Agent session cancelled");
            }
            CoverMessage::SessionsCancelled { ids, .. } => {
                let scope = self.active_scope();
                for id in &ids {
                    scope.cancel_session(id);
                }
                tracing::info!(agent, sessions = ?ids, "Agent sessions cancelled");
                self.send_active_sessions().await?;
            }
            CoverMessage::CoverDataPart { session_id, data } => {
                if self.active_scope().add_probes(&session_id, data).is_none() {
                    tracing::info!(agent, session = %session_id, "No active session with id");
                }
            }
            CoverMessage::SessionChanged { .. } => {
                self.active_scope().probes_changed();
            }
            CoverMessage::SessionFinished { session_id, .. } => {
                if self.finish_session(&session_id).await?.is_none() {
                    tracing::info!(agent, session = %session_id, "No active session with id");
                }
            }
            CoverMessage::SessionsFinished { ids, .. } => {
                for id in &ids {
                    if self.finish_session(id).await?.is_none() {
                        tracing::info!(agent, session = %id, "No active session with id");
                    }
                }
            }
            CoverMessage::SessionsState { ids } => {
                tracing::info!(agent, sessions = ?ids, "Message is not supported: SESSIONS_STATE");
            }
        }
        Ok(())
    }

    /// Finish a live session of the active scope
    ///
    /// A session that recorded probes is stored right away and the scope
    /// coverage is recomputed. Returns `None` if the session is not live.
    /// A session whose write fails stays pending and is written again on the
    /// next finish, scope switch or build recompute.
    ///
    /// # Errors
    /// Returns [`CoverageError`] if storing, computing or reporting fails.
    pub async fn finish_session(&self, session_id: &str) -> Result<Option<FinishedSession>, CoverageError> {
        if self.flush_pending().await? {
            self.calculate_and_send_build_coverage().await?;
        }
        let scope = self.active_scope();
        let Some(finished) = scope.finish_session(session_id) else {
            return Ok(None);
        };
        if !finished.is_empty() {
            if let Err(error) = self.scopes.store_session(scope.id(), &finished).await {
                tracing::warn!(scope = scope.id(), session = session_id, %error, "Session write failed, kept pending");
                self.pending.lock().sessions.push((scope.id().to_string(), finished));
                return Err(error.into());
            }
        }
        self.send_active_sessions().await?;
        if !finished.is_empty() {
            let snapshot = scope.snapshot();
            self.send_scope_coverage(&scope, &snapshot).await?;
        }
        Ok(Some(finished))
    }

    /// Stop the change consumer and close the active scope
    pub fn close(&self) {
        self.active_scope().close();
        if let Some(consumer) = self.consumer.lock().take() {
            consumer.abort();
        }
    }

    async fn start_session(&self, payload: StartPayload) -> Result<ActionResult, CoverageError> {
        let session_id = if payload.session_id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            payload.session_id
        };
        let test_name = if payload.test_name.is_empty() {
            self.config.default_test_name.clone()
        } else {
            payload.test_name
        };
        let is_realtime = self.config.realtime && payload.is_realtime;
        let session = ActiveSession::new(session_id, payload.test_type, test_name)
            .global(payload.is_global)
            .realtime(is_realtime);

        match self.active_scope().start_session(session) {
            Ok(session) => {
                self.send_active_sessions().await?;
                ActionResult::command(&AgentCommand::StartAgentSession(StartSessionPayload {
                    session_id: session.id().to_string(),
                    test_type: session.test_type().to_string(),
                    test_name: session.name().to_string(),
                    is_global: session.is_global(),
                    is_realtime: session.is_realtime(),
                }))
            }
            Err(StartRejection::GlobalSessionActive) => {
                Ok(ActionResult::new(status::CONFLICT, GLOBAL_SESSION_CONFLICT))
            }
            Err(StartRejection::DuplicateId(_)) => {
                ActionResult::field_error(status::CONFLICT, "sessionId", DUPLICATE_SESSION)
            }
            Err(rejection @ StartRejection::ScopeFinished) => {
                Ok(ActionResult::new(status::CONFLICT, rejection.to_string()))
            }
        }
    }

    async fn change_active_scope(&self, payload: ActiveScopeChangePayload) -> Result<ActionResult, CoverageError> {
        let name = payload.scope_name.trim();
        if !name.is_empty() && self.scope_name_taken(name, None).await? {
            return Ok(ActionResult::new(
                status::BAD_REQUEST,
                format!("Failed to switch to a new scope: name {name} is already in use"),
            ));
        }
        let mut recompute = self.flush_pending().await?;
        let nth = self.scope_nth.fetch_add(1, Ordering::AcqRel) + 1;
        let name = if name.is_empty() {
            format!("{} {nth}", self.config.default_scope_name)
        } else {
            name.to_string()
        };
        let next = Arc::new(ActiveScope::named(nth, name, self.build_version.as_str()));
        let prev = std::mem::replace(&mut *self.active_scope.write(), Arc::clone(&next));
        if self.context().is_some() {
            self.subscribe(&next);
        }
        tracing::info!(agent = %self.agent_id, prev = prev.id(), next = next.id(), "Active scope switched");

        if let Some(finished) = prev.finish(payload.prev_scope_enabled) {
            if payload.save_prev_scope && finished.sessions().next().is_some() {
                if let Err(error) = self.scopes.store(&finished).await {
                    tracing::warn!(scope = %finished.id, %error, "Scope write failed, kept pending");
                    self.pending.lock().scopes.push(finished);
                    return Err(error.into());
                }
                self.reporter
                    .send(Route::ScopeSummary(finished.id.clone()), &finished.summary)
                    .await?;
                recompute |= finished.enabled;
            } else {
                let dropped = self.scopes.delete_sessions(&finished.id).await?;
                tracing::debug!(scope = %finished.id, sessions = dropped, "Finished scope not kept");
            }
        }

        self.send_active_scope().await?;
        self.send_active_sessions().await?;
        self.send_scopes().await?;
        if recompute {
            self.calculate_and_send_build_coverage().await?;
        }
        ActionResult::command(&AgentCommand::InitActiveScope(InitScopePayload {
            id: next.id().to_string(),
            name: next.name(),
            prev_id: prev.id().to_string(),
        }))
    }

    async fn rename_scope(&self, scope_id: &str, name: &str) -> Result<ActionResult, CoverageError> {
        let name = name.trim();
        if name.is_empty() {
            return Ok(ActionResult::new(status::BAD_REQUEST, "Scope name cannot be empty"));
        }
        if self.scope_name_taken(name, Some(scope_id)).await? {
            return Ok(ActionResult::new(
                status::BAD_REQUEST,
                format!("Scope with name '{name}' already exists"),
            ));
        }
        let active = self.active_scope();
        if active.id() == scope_id {
            active.rename(name);
            self.send_active_scope().await?;
            return Ok(ActionResult::ok(""));
        }
        let Some(mut scope) = self.finished_scope(scope_id).await? else {
            return Ok(scope_not_found(scope_id));
        };
        scope.name = name.to_string();
        scope.summary.name = name.to_string();
        self.scopes.store(&scope).await?;
        self.reporter
            .send(Route::ScopeSummary(scope.id.clone()), &scope.summary)
            .await?;
        self.send_scopes().await?;
        Ok(ActionResult::ok(""))
    }

    async fn toggle_scope(&self, scope_id: &str) -> Result<ActionResult, CoverageError> {
        if self.active_scope().id() == scope_id {
            return Ok(ActionResult::new(status::BAD_REQUEST, "Active scope cannot be toggled"));
        }
        let Some(scope) = self.finished_scope(scope_id).await? else {
            return Ok(scope_not_found(scope_id));
        };
        let scope = scope.toggled();
        self.scopes.store(&scope).await?;
        tracing::info!(scope = scope_id, enabled = scope.enabled, "Scope toggled");
        self.reporter
            .send(Route::ScopeSummary(scope.id.clone()), &scope.summary)
            .await?;
        self.send_scopes().await?;
        self.calculate_and_send_build_coverage().await?;
        Ok(ActionResult::ok(""))
    }

    async fn drop_scope(&self, scope_id: &str) -> Result<ActionResult, CoverageError> {
        if self.active_scope().id() == scope_id {
            return Ok(ActionResult::new(status::BAD_REQUEST, "Active scope cannot be dropped"));
        }
        if self.finished_scope(scope_id).await?.is_none() {
            return Ok(scope_not_found(scope_id));
        }
        let Some(scope) = self.scopes.delete_by_id(scope_id).await? else {
            return Ok(scope_not_found(scope_id));
        };
        self.send_scopes().await?;
        if scope.enabled {
            self.calculate_and_send_build_coverage().await?;
        }
        Ok(ActionResult::ok(""))
    }

    async fn remove_build(&self, version: &str) -> Result<ActionResult, CoverageError> {
        let parent = self.context().and_then(|c| c.parent_version().map(str::to_string));
        if version == self.build_version || parent.as_deref() == Some(version) {
            return Ok(ActionResult::new(
                status::BAD_REQUEST,
                "Can not remove a current or baseline build",
            ));
        }
        let scopes = self.scopes.delete_by_version(version).await?;
        self.client.delete::<StoredBuild>(version).await?;
        tracing::info!(agent = %self.agent_id, build = version, scopes, "Build data removed");
        Ok(ActionResult::ok(""))
    }

    async fn toggle_baseline(&self) -> Result<ActionResult, CoverageError> {
        let current = self.baseline().await?;
        let parent = self.context().and_then(|c| c.parent_version().map(str::to_string));
        let baseline = current.toggled(&self.build_version, parent.as_deref());
        self.client
            .store(&GlobalAgentData {
                agent_id: self.agent_id.clone(),
                baseline: baseline.clone(),
            })
            .await?;
        tracing::info!(agent = %self.agent_id, baseline = %baseline.version, "Baseline toggled");
        self.send_baseline(&baseline).await?;
        Ok(ActionResult::ok(serde_json::to_value(&baseline)?))
    }

    async fn baseline(&self) -> Result<Baseline, CoverageError> {
        Ok(self
            .client
            .find_by_id::<GlobalAgentData>(&self.agent_id)
            .await?
            .map(|data| data.baseline)
            .unwrap_or_default())
    }

    /// Finished scope of this build, without session data
    async fn finished_scope(&self, scope_id: &str) -> Result<Option<FinishedScope>, CoverageError> {
        Ok(self
            .client
            .find_by_id::<FinishedScope>(scope_id)
            .await?
            .filter(|scope| scope.build_version == self.build_version))
    }

    async fn scope_name_taken(&self, name: &str, except: Option<&str>) -> Result<bool, CoverageError> {
        let active = self.active_scope();
        if Some(active.id()) != except && active.name() == name {
            return Ok(true);
        }
        let finished = self.scopes.by_version(&self.build_version, false).await?;
        Ok(finished
            .iter()
            .any(|scope| Some(scope.id.as_str()) != except && scope.name == name))
    }

    /// Write sessions and scopes left pending by failed writes
    ///
    /// Sessions go first so a scope is never stored without them. Whatever
    /// is still failing stays pending. Returns whether an enabled scope was
    /// stored, so build coverage has to be recomputed.
    async fn flush_pending(&self) -> Result<bool, CoverageError> {
        let sessions = std::mem::take(&mut self.pending.lock().sessions);
        let mut sessions = sessions.into_iter();
        while let Some((scope_id, session)) = sessions.next() {
            if let Err(error) = self.scopes.store_session(&scope_id, &session).await {
                let mut pending = self.pending.lock();
                pending.sessions.push((scope_id, session));
                pending.sessions.extend(sessions);
                return Err(error.into());
            }
            tracing::info!(scope = %scope_id, session = %session.id, "Pending session stored");
        }

        let scopes = std::mem::take(&mut self.pending.lock().scopes);
        let mut scopes = scopes.into_iter();
        let mut enabled = false;
        while let Some(scope) = scopes.next() {
            if let Err(error) = self.scopes.store(&scope).await {
                let mut pending = self.pending.lock();
                pending.scopes.push(scope);
                pending.scopes.extend(scopes);
                return Err(error.into());
            }
            tracing::info!(scope = %scope.id, "Pending scope stored");
            self.reporter
                .send(Route::ScopeSummary(scope.id.clone()), &scope.summary)
                .await?;
            enabled |= scope.enabled;
        }
        Ok(enabled)
    }

    fn begin_class_data(&self, init: bool, classes_count: usize) {
        let mut data = self.data.lock();
        if init || matches!(*data, BuildData::NoData) {
            *data = BuildData::Building(Vec::with_capacity(classes_count));
        }
    }

    fn add_class_data(&self, classes: Vec<ClassMetadata>) {
        let mut data = self.data.lock();
        if let BuildData::Building(received) = &mut *data {
            tracing::debug!(agent = %self.agent_id, classes = classes.len(), "Class metadata received");
            received.extend(classes);
        } else {
            tracing::warn!(agent = %self.agent_id, classes = classes.len(), "Class metadata outside initialization dropped");
        }
    }

    fn pending_classes(&self) -> Option<Vec<ClassMetadata>> {
        match &*self.data.lock() {
            BuildData::Building(classes) => Some(classes.clone()),
            _ => None,
        }
    }

    fn set_ready(&self, context: Arc<CoverContext>) {
        *self.data.lock() = BuildData::Ready(context);
    }

    async fn initialized(&self) -> Result<(), CoverageError> {
        let Some(classes) = self.pending_classes() else {
            tracing::info!(agent = %self.agent_id, "Initialized without pending class metadata, ignored");
            return Ok(());
        };
        let build = StoredBuild {
            version: self.build_version.clone(),
            parent_version: self.resolve_parent().await?,
            classes,
        };
        self.client.store(&build).await?;
        let context = self.build_context(build).await?;
        self.set_ready(Arc::clone(&context));
        self.process_initialized(&context).await
    }

    /// Parent stored for this build before, else the agent's baseline
    async fn resolve_parent(&self) -> Result<Option<String>, CoverageError> {
        if let Some(stored) = self.client.find_by_id::<StoredBuild>(&self.build_version).await? {
            return Ok(stored.parent_version);
        }
        let baseline = self.baseline().await?.version;
        Ok(Some(baseline).filter(|v| !v.is_empty() && *v != self.build_version))
    }

    async fn build_context(&self, build: StoredBuild) -> Result<Arc<CoverContext>, CoverageError> {
        let parent_methods = match build.parent_version.as_deref() {
            Some(parent) => match self.client.find_by_id::<StoredBuild>(parent).await? {
                Some(parent) => parent.methods(),
                None => {
                    tracing::warn!(build = %build.version, parent, "Parent build data not found, diffing against an empty build");
                    Vec::new()
                }
            },
            None => Vec::new(),
        };
        let (registry, skipped) = ClassRegistry::from_classes(build.classes);
        for error in &skipped {
            tracing::warn!(%error, "Class metadata skipped");
        }
        Ok(Arc::new(CoverContext::new(
            build.version,
            build.parent_version,
            registry,
            &parent_methods,
        )))
    }

    /// Run scope coverage recomputes for `scope` in the background
    fn subscribe(&self, scope: &Arc<ActiveScope>) {
        let state = self.this.clone();
        let consumer = scope.subscribe_on_changes(move |scope, sessions| {
            let state = state.clone();
            async move {
                let Some(state) = state.upgrade() else { return };
                tracing::debug!(scope = scope.id(), sessions = sessions.len(), "Recomputing scope coverage");
                if let Err(error) = state.send_scope_coverage(&scope, &sessions).await {
                    tracing::warn!(scope = scope.id(), %error, "Scope coverage recompute failed");
                }
            }
        });
        if let Some(consumer) = consumer {
            *self.consumer.lock() = Some(consumer);
        }
    }
}

impl Drop for AgentState {
    fn drop(&mut self) {
        self.close();
    }
}

fn unsupported(action: &str) -> ActionResult {
    let message = format!("Action '{action}' is not supported!");
    tracing::error!("{message}");
    ActionResult::new(status::BAD_REQUEST, message)
}

fn scope_not_found(scope_id: &str) -> ActionResult {
    ActionResult::new(status::NOT_FOUND, format!("Scope '{scope_id}' not found."))
}
