//! Scope switching, scope management and baselines

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use tcov_core::summary::{AgentSummary, BuildCoverage, RiskDto};
use tcov_core::{
    status, Action, ActiveScopeChangePayload, AgentState, BuildPayload, CoverMessage, CoverPayload, CoverageError,
    MemorySink, RenameScopePayload, Route, ScopePayload, StartPayload, Target, TcovConfig,
};
use tcov_counter::ClassMetadata;
use tcov_model::Count;
use tcov_session::{FinishedScope, ScopeSummary};
use tcov_store::{JsonDirStore, Record, StoreClient};
use tcov_test_utils::{class, exec, memory_client, FaultyStore};

const SVC: &str = "com/acme/Svc";

fn classes() -> Vec<ClassMetadata> {
    vec![class(SVC).method("run", "r1", &[4, 6]).method("stop", "s1", &[5]).build()]
}

async fn initialized(
    client: StoreClient,
    sink: Arc<MemorySink>,
    build: &str,
    classes: Vec<ClassMetadata>,
) -> Arc<AgentState> {
    let state = AgentState::new("petclinic", build, client, sink, TcovConfig::default());
    state
        .process_message(CoverMessage::InitInfo {
            classes_count: classes.len(),
            message: String::new(),
            init: true,
        })
        .await
        .unwrap();
    state.process_message(CoverMessage::InitDataPart { classes }).await.unwrap();
    state
        .process_message(CoverMessage::Initialized { msg: String::new() })
        .await
        .unwrap();
    state
}

/// Start a session in the active scope and record `hits`
async fn running(state: &AgentState, session_id: &str, hits: &[u32]) {
    let started = state
        .do_action(Action::StartNewSession(StartPayload {
            session_id: session_id.into(),
            test_type: "AUTO".into(),
            ..StartPayload::default()
        }))
        .await
        .unwrap();
    assert!(started.is_ok());
    let added = state
        .do_action(Action::AddCoverage(CoverPayload {
            session_id: session_id.into(),
            data: vec![exec(SVC, 3, hits)],
        }))
        .await
        .unwrap();
    assert!(added.is_ok());
}

fn finished(session_id: &str) -> CoverMessage {
    CoverMessage::SessionFinished {
        session_id: session_id.into(),
        ts: 0,
    }
}

/// Run a finished session hitting `hits` in the active scope
async fn covered(state: &AgentState, session_id: &str, hits: &[u32]) {
    running(state, session_id, hits).await;
    state.process_message(finished(session_id)).await.unwrap();
}

async fn on_disk(root: &std::path::Path) -> StoreClient {
    StoreClient::new(JsonDirStore::open(root).await.unwrap())
}

fn switch(name: &str, save: bool, enabled: bool) -> Action {
    Action::SwitchActiveScope(ActiveScopeChangePayload {
        scope_name: name.into(),
        save_prev_scope: save,
        prev_scope_enabled: enabled,
    })
}

fn scope(id: &str) -> ScopePayload {
    ScopePayload { scope_id: id.into() }
}

fn decode<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> T {
    serde_json::from_value(payload.expect("report was not sent")).unwrap()
}

#[tokio::test]
async fn saved_scope_counts_towards_the_build() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), "1.0", classes()).await;
    let first = state.active_scope();
    covered(&state, "s1", &[0, 1]).await;

    let result = state.do_action(switch("smoke", true, true)).await.unwrap();
    assert_eq!(result.data["type"], "INIT_ACTIVE_SCOPE");
    assert_eq!(result.data["payload"]["name"], "smoke");
    assert_eq!(result.data["payload"]["prev_id"], first.id());
    assert_eq!(state.active_scope().name(), "smoke");
    assert!(first.is_finished());

    let stored = state.scope_manager().by_version("1.0", true).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].name, "New Scope 1");
    assert_eq!(stored[0].sessions().count(), 1);

    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(10, 15));
    assert_eq!(coverage.risk_count, Count::new(1, 2));
    assert_eq!(coverage.finished_scopes_count, 1);

    let risks: Vec<RiskDto> = decode(sink.last(&Route::Risks));
    assert_eq!(risks.len(), 2);
    let summary: AgentSummary = decode(sink.last(&Route::Summary));
    assert_eq!(summary.not_covered_risk_counts.total, 1);

    let scopes: Vec<ScopeSummary> = decode(sink.last(&Route::FinishedScopes));
    assert_eq!(scopes.len(), 1);
    assert!(!scopes[0].active);

    let taken = state.do_action(switch("New Scope 1", true, true)).await.unwrap();
    assert_eq!(taken.code, status::BAD_REQUEST);
}

#[tokio::test]
async fn unsaved_scope_is_discarded() {
    let state = initialized(memory_client(), MemorySink::new(), "1.0", classes()).await;
    let first = state.active_scope();
    covered(&state, "s1", &[0]).await;
    assert_eq!(state.scope_manager().load_sessions(first.id()).await.unwrap().len(), 1);

    let result = state.do_action(switch("", false, true)).await.unwrap();
    assert!(result.is_ok());
    assert_eq!(state.active_scope().name(), "New Scope 2");
    assert!(state.scope_manager().load_sessions(first.id()).await.unwrap().is_empty());
    assert!(state.scope_manager().by_version("1.0", false).await.unwrap().is_empty());
}

#[tokio::test]
async fn finished_scopes_can_be_toggled_renamed_and_dropped() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), "1.0", classes()).await;
    let first = state.active_scope().id().to_string();
    covered(&state, "s1", &[2]).await;
    state.do_action(switch("second", true, true)).await.unwrap();
    let active = state.active_scope().id().to_string();

    let result = state.do_action(Action::ToggleScope(scope(&first))).await.unwrap();
    assert!(result.is_ok());
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(0, 15));
    assert_eq!(coverage.finished_scopes_count, 0);
    let toggled: ScopeSummary = decode(sink.last(&Route::ScopeSummary(first.clone())));
    assert!(!toggled.enabled);

    state.do_action(Action::ToggleScope(scope(&first))).await.unwrap();
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(5, 15));

    let rename = |id: &str, name: &str| {
        Action::RenameScope(RenameScopePayload {
            scope_id: id.into(),
            scope_name: name.into(),
        })
    };
    assert!(state.do_action(rename(&first, "nightly")).await.unwrap().is_ok());
    let stored = state.scope_manager().by_id(&first).await.unwrap().unwrap();
    assert_eq!(stored.name, "nightly");
    assert_eq!(stored.summary.name, "nightly");
    assert_eq!(state.do_action(rename(&active, "nightly")).await.unwrap().code, status::BAD_REQUEST);
    assert_eq!(state.do_action(rename(&active, " ")).await.unwrap().code, status::BAD_REQUEST);
    assert!(state.do_action(rename(&active, "current")).await.unwrap().is_ok());
    assert_eq!(state.active_scope().name(), "current");
    assert_eq!(state.do_action(rename("missing", "x")).await.unwrap().code, status::NOT_FOUND);

    assert_eq!(
        state.do_action(Action::ToggleScope(scope(&active))).await.unwrap().code,
        status::BAD_REQUEST
    );
    assert_eq!(
        state.do_action(Action::DropScope(scope(&active))).await.unwrap().code,
        status::BAD_REQUEST
    );
    assert_eq!(
        state.do_action(Action::DropScope(scope("missing"))).await.unwrap().code,
        status::NOT_FOUND
    );

    assert!(state.do_action(Action::DropScope(scope(&first))).await.unwrap().is_ok());
    assert!(state.scope_manager().by_id(&first).await.unwrap().is_none());
    assert!(state.scope_manager().load_sessions(&first).await.unwrap().is_empty());
    assert_eq!(sink.last(&Route::FinishedScopes), Some(json!([])));
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(0, 15));
}

#[tokio::test]
async fn child_build_diffs_against_the_baseline() {
    let client = memory_client();
    let sink = MemorySink::new();
    let first = initialized(client.clone(), sink.clone(), "1.0", classes()).await;

    let toggled = first.do_action(Action::ToggleBaseline).await.unwrap();
    assert_eq!(toggled.data["version"], "1.0");
    assert_eq!(sink.last(&Route::Baseline), Some(json!("1.0")));
    first.close();

    let changed = vec![class(SVC)
        .method("run", "r2", &[4, 6])
        .method("stop", "s1", &[5])
        .method("pause", "p1", &[2])
        .build()];
    let sink = MemorySink::new();
    let second = initialized(client.clone(), sink.clone(), "1.1", changed).await;

    let context = second.context().unwrap();
    assert_eq!(context.parent_version(), Some("1.0"));
    assert_eq!(context.diff().new.len(), 1);
    assert_eq!(context.diff().modified.len(), 1);
    assert_eq!(context.diff().unaffected.len(), 1);
    assert_eq!(sink.last(&Route::Parent), Some(json!("1.0")));

    let summary: AgentSummary = decode(sink.last(&Route::Summary));
    assert_eq!(summary.risk_counts.new, 1);
    assert_eq!(summary.risk_counts.modified, 1);
    assert_eq!(summary.risk_counts.total, 2);

    let removed = second
        .do_action(Action::RemoveBuild(BuildPayload { version: "1.0".into() }))
        .await
        .unwrap();
    assert_eq!(removed.code, status::BAD_REQUEST);
    let removed = second
        .do_action(Action::RemoveBuild(BuildPayload { version: "0.9".into() }))
        .await
        .unwrap();
    assert!(removed.is_ok());

    let toggled = second.do_action(Action::ToggleBaseline).await.unwrap();
    assert_eq!(toggled.data["version"], "1.1");
    assert_eq!(toggled.data["parent_version"], "1.0");
    let toggled = second.do_action(Action::ToggleBaseline).await.unwrap();
    assert_eq!(toggled.data["version"], "1.0");
}

#[tokio::test]
async fn stored_build_is_restored() {
    let client = memory_client();
    let first = initialized(client.clone(), MemorySink::new(), "1.0", classes()).await;
    covered(&first, "s1", &[0]).await;
    first.do_action(switch("kept", true, true)).await.unwrap();
    first.close();

    let sink = MemorySink::new();
    let restored = AgentState::new("petclinic", "1.0", client.clone(), sink.clone(), TcovConfig::default());
    assert!(restored.initialize().await.unwrap());
    assert!(restored.context().is_some());
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(4, 15));
    assert_eq!(coverage.finished_scopes_count, 1);

    let unknown = AgentState::new("petclinic", "2.0", client, MemorySink::new(), TcovConfig::default());
    assert!(!unknown.initialize().await.unwrap());
    assert!(unknown.context().is_none());
}

#[tokio::test]
async fn scopes_survive_a_restart_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("db");

    let first = initialized(on_disk(&root).await, MemorySink::new(), "1.0", classes()).await;
    covered(&first, "s1", &[0, 1]).await;
    first.do_action(switch("nightly", true, true)).await.unwrap();
    first.close();
    drop(first);

    let sink = MemorySink::new();
    let restored = AgentState::new("petclinic", "1.0", on_disk(&root).await, sink.clone(), TcovConfig::default());
    assert!(restored.initialize().await.unwrap());
    let scopes: Vec<ScopeSummary> = decode(sink.last(&Route::FinishedScopes));
    assert_eq!(scopes.len(), 1);
    assert_eq!(scopes[0].name, "New Scope 1");
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(10, 15));
}

#[tokio::test]
async fn failed_session_write_is_retried_before_the_scope_is_saved() {
    let store = FaultyStore::new();
    let sink = MemorySink::new();
    let state = initialized(store.client(), sink.clone(), "1.0", classes()).await;
    let first = state.active_scope().id().to_string();
    running(&state, "s1", &[0]).await;

    store.fail_writes(true);
    let result = state.process_message(finished("s1")).await;
    assert!(matches!(result, Err(CoverageError::Storage(_))));
    assert!(state.active_scope().active_sessions().is_empty());

    let switched = state.do_action(switch("nightly", true, true)).await;
    assert!(matches!(switched, Err(CoverageError::Storage(_))));
    assert_eq!(state.active_scope().id(), first);
    assert!(!state.active_scope().is_finished());

    store.fail_writes(false);
    let result = state.do_action(switch("nightly", true, true)).await.unwrap();
    assert_eq!(result.data["payload"]["prev_id"], first.as_str());

    let sessions = state.scope_manager().load_sessions(&first).await.unwrap();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, "s1");
    let stored = state.scope_manager().by_version("1.0", true).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sessions().count(), 1);

    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(4, 15));
    assert_eq!(coverage.finished_scopes_count, 1);
}

#[tokio::test]
async fn failed_scope_write_is_stored_on_the_next_switch() {
    let store = FaultyStore::new();
    let sink = MemorySink::new();
    let state = initialized(store.client(), sink.clone(), "1.0", classes()).await;
    let first = state.active_scope().id().to_string();
    covered(&state, "s1", &[0, 1]).await;

    store.fail_collection(Some(<FinishedScope as Record>::COLLECTION));
    let switched = state.do_action(switch("nightly", true, true)).await;
    assert!(matches!(switched, Err(CoverageError::Storage(_))));
    assert_eq!(state.active_scope().name(), "nightly");
    assert!(state.scope_manager().by_version("1.0", false).await.unwrap().is_empty());

    store.fail_collection(None);
    let result = state.do_action(switch("", false, true)).await.unwrap();
    assert!(result.is_ok());

    let stored = state.scope_manager().by_version("1.0", true).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, first);
    assert_eq!(stored[0].sessions().count(), 1);

    let summary: ScopeSummary = decode(sink.last(&Route::ScopeSummary(first.clone())));
    assert_eq!(summary.name, "New Scope 1");
    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(10, 15));
    assert_eq!(coverage.finished_scopes_count, 1);
}
