//! Agent initialization, session lifecycle and background recompute

use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tcov_core::summary::{AgentSummary, BuildCoverage};
use tcov_core::{
    status, Action, AgentState, CoverMessage, CoverPayload, CoverageError, MemorySink, Route, SessionPayload,
    StartPayload, Target, TcovConfig,
};
use tcov_counter::ClassMetadata;
use tcov_model::{package_of, Count, TypedTest};
use tcov_session::ScopeSummary;
use tcov_store::StoreClient;
use tcov_test_utils::{class, exec, memory_client, FaultyStore};

const SVC: &str = "com/acme/Svc";

/// `run` owns probes 0 and 1 (4 + 6 instructions), `stop` owns probe 2 (5)
fn classes() -> Vec<ClassMetadata> {
    vec![class(SVC).method("run", "r1", &[4, 6]).method("stop", "s1", &[5]).build()]
}

async fn initialized(client: StoreClient, sink: Arc<MemorySink>, config: TcovConfig) -> Arc<AgentState> {
    let state = AgentState::new("petclinic", "1.0", client, sink, config);
    state
        .process_message(CoverMessage::InitInfo {
            classes_count: 1,
            message: "loading".into(),
            init: true,
        })
        .await
        .unwrap();
    state
        .process_message(CoverMessage::InitDataPart { classes: classes() })
        .await
        .unwrap();
    state
        .process_message(CoverMessage::Initialized { msg: String::new() })
        .await
        .unwrap();
    state
}

fn start(session_id: &str) -> Action {
    Action::StartNewSession(StartPayload {
        session_id: session_id.into(),
        test_type: "AUTO".into(),
        ..StartPayload::default()
    })
}

fn add(session_id: &str, hits: &[u32]) -> Action {
    Action::AddCoverage(CoverPayload {
        session_id: session_id.into(),
        data: vec![exec(SVC, 3, hits)],
    })
}

fn decode<T: serde::de::DeserializeOwned>(payload: Option<Value>) -> T {
    serde_json::from_value(payload.expect("report was not sent")).unwrap()
}

#[tokio::test]
async fn initialization_reports_the_build() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), TcovConfig::default()).await;

    let context = state.context().unwrap();
    assert_eq!(context.parent_version(), None);
    assert_eq!(context.diff().new.len(), 2);

    let coverage: BuildCoverage = decode(sink.last(&Route::Coverage(Target::Build)));
    assert_eq!(coverage.count, Count::new(0, 15));
    assert_eq!(coverage.risk_count, Count::new(0, 2));
    assert_eq!(coverage.finished_scopes_count, 0);

    let summary: AgentSummary = decode(sink.last(&Route::Summary));
    assert_eq!(summary.risk_counts.new, 2);
    assert_eq!(summary.not_covered_risk_counts.total, 2);

    assert_eq!(sink.last(&Route::Parent), Some(json!("")));
    assert_eq!(sink.last(&Route::Baseline), Some(json!("")));
    let active: ScopeSummary = decode(sink.last(&Route::ActiveScope));
    assert_eq!(active.name, "New Scope 1");
    assert!(active.active);
}

#[tokio::test]
async fn metadata_outside_initialization_is_ignored() {
    let sink = MemorySink::new();
    let state = AgentState::new("petclinic", "1.0", memory_client(), sink.clone(), TcovConfig::default());

    state
        .process_message(CoverMessage::InitDataPart { classes: classes() })
        .await
        .unwrap();
    state
        .process_message(CoverMessage::Initialized { msg: String::new() })
        .await
        .unwrap();

    assert!(state.context().is_none());
    assert!(sink.is_empty());
}

#[tokio::test]
async fn finished_session_is_stored_and_counted() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), TcovConfig::default()).await;
    let scope = state.active_scope();

    let started = state.do_action(start("s1")).await.unwrap();
    assert!(started.is_ok());
    assert_eq!(started.data["type"], "START_AGENT_SESSION");
    assert_eq!(started.data["payload"]["test_name"], "unspecified");
    assert_eq!(sink.last(&Route::ActiveSessions).unwrap().as_array().unwrap().len(), 1);

    assert!(state.do_action(add("s1", &[0])).await.unwrap().is_ok());
    state
        .process_message(CoverMessage::SessionFinished {
            session_id: "s1".into(),
            ts: 0,
        })
        .await
        .unwrap();

    assert_eq!(scope.finished_sessions().len(), 1);
    assert_eq!(state.scope_manager().load_sessions(scope.id()).await.unwrap().len(), 1);
    assert_eq!(sink.last(&Route::ActiveSessions), Some(json!([])));

    let summary: ScopeSummary = decode(sink.last(&Route::ScopeSummary(scope.id().to_string())));
    assert_eq!(summary.sessions_finished, 1);
    assert_eq!(summary.coverage.count, Count::new(4, 15));
    assert_eq!(summary.coverage.method_count, Count::new(1, 2));

    let target = Target::Scope(scope.id().to_string());
    assert!(sink.last(&Route::Coverage(target.clone())).is_some());
    assert_eq!(sink.count(&Route::Package(target.clone(), package_of(SVC).to_string())), 1);
    let test_id = TypedTest::new("unspecified", "AUTO").id();
    let covered = sink.last(&Route::MethodsCoveredByTest(target, test_id)).unwrap();
    assert_eq!(covered["summary"]["method_counts"]["all"], 1);
}

#[tokio::test]
async fn unknown_sessions_are_not_errors() {
    let state = initialized(memory_client(), MemorySink::new(), TcovConfig::default()).await;

    let result = state.do_action(add("nope", &[0])).await.unwrap();
    assert_eq!(result.code, status::NOT_FOUND);
    assert_eq!(result.data, json!("Active session 'nope' not found."));

    let result = state
        .do_action(Action::CancelSession(SessionPayload {
            session_id: "nope".into(),
        }))
        .await
        .unwrap();
    assert_eq!(result.code, status::NOT_FOUND);

    let result = state
        .do_action(Action::StopSession(SessionPayload {
            session_id: "nope".into(),
        }))
        .await
        .unwrap();
    assert_eq!(result.code, status::NOT_FOUND);

    state
        .process_message(CoverMessage::SessionFinished {
            session_id: "nope".into(),
            ts: 0,
        })
        .await
        .unwrap();
    state
        .process_message(CoverMessage::CoverDataPart {
            session_id: "nope".into(),
            data: vec![exec(SVC, 3, &[0])],
        })
        .await
        .unwrap();
}

#[tokio::test]
async fn conflicting_starts_are_declined() {
    let state = initialized(memory_client(), MemorySink::new(), TcovConfig::default()).await;
    state.do_action(start("s1")).await.unwrap();

    let duplicate = state.do_action(start("s1")).await.unwrap();
    assert_eq!(duplicate.code, status::CONFLICT);
    assert_eq!(duplicate.data["field"], "sessionId");

    let global = |id: &str| {
        Action::StartNewSession(StartPayload {
            session_id: id.into(),
            test_type: "MANUAL".into(),
            is_global: true,
            ..StartPayload::default()
        })
    };
    assert!(state.do_action(global("g1")).await.unwrap().is_ok());
    let second = state.do_action(global("g2")).await.unwrap();
    assert_eq!(second.code, status::CONFLICT);
    assert_eq!(
        second.data,
        json!("Error! Only one active global session is allowed. Please finish the active one in order to start new.")
    );
}

#[tokio::test]
async fn generated_ids_and_realtime_gate() {
    let config = TcovConfig::default().with_realtime(false);
    let state = initialized(memory_client(), MemorySink::new(), config).await;

    let result = state
        .do_action(Action::StartNewSession(StartPayload {
            test_type: "AUTO".into(),
            test_name: "login".into(),
            is_realtime: true,
            ..StartPayload::default()
        }))
        .await
        .unwrap();
    let payload = &result.data["payload"];
    assert!(uuid::Uuid::parse_str(payload["session_id"].as_str().unwrap()).is_ok());
    assert_eq!(payload["test_name"], "login");
    assert_eq!(payload["is_realtime"], false);
}

#[tokio::test]
async fn cancelled_sessions_leave_nothing_behind() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), TcovConfig::default()).await;
    let scope = state.active_scope();
    for id in ["s1", "s2", "s3"] {
        state.do_action(start(id)).await.unwrap();
        state.do_action(add(id, &[2])).await.unwrap();
    }

    let cancelled = state
        .do_action(Action::CancelSession(SessionPayload { session_id: "s1".into() }))
        .await
        .unwrap();
    assert_eq!(cancelled.data["type"], "CANCEL_AGENT_SESSION");

    state
        .process_message(CoverMessage::SessionsCancelled {
            ids: vec!["s2".into()],
            ts: 0,
        })
        .await
        .unwrap();
    assert_eq!(scope.active_sessions().len(), 1);

    let all = state.do_action(Action::CancelAllSessions).await.unwrap();
    assert_eq!(all.data["type"], "CANCEL_ALL_AGENT_SESSIONS");
    assert!(scope.active_sessions().is_empty());
    assert!(scope.finished_sessions().is_empty());
    assert_eq!(sink.last(&Route::ActiveSessions), Some(json!([])));
}

#[tokio::test]
async fn probe_updates_trigger_a_background_recompute() {
    let sink = MemorySink::new();
    let state = initialized(memory_client(), sink.clone(), TcovConfig::default()).await;
    state.do_action(start("s1")).await.unwrap();
    state.do_action(add("s1", &[0, 1])).await.unwrap();

    let recomputed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if let Some(summary) = sink.last(&Route::ActiveScope) {
                let summary: ScopeSummary = serde_json::from_value(summary).unwrap();
                if summary.coverage.count == Count::new(10, 15) {
                    return summary;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("scope coverage was not recomputed");
    assert_eq!(recomputed.coverage.method_count, Count::new(1, 2));
}

#[tokio::test]
async fn storage_failures_propagate() {
    let store = FaultyStore::new();
    let state = initialized(store.client(), MemorySink::new(), TcovConfig::default()).await;
    state.do_action(start("s1")).await.unwrap();
    state.do_action(add("s1", &[0])).await.unwrap();

    store.fail_writes(true);
    let result = state
        .process_message(CoverMessage::SessionFinished {
            session_id: "s1".into(),
            ts: 0,
        })
        .await;
    assert!(matches!(result, Err(CoverageError::Storage(_))));
}

#[tokio::test]
async fn raw_input_is_decoded() {
    let state = initialized(memory_client(), MemorySink::new(), TcovConfig::default()).await;

    let started = state
        .do_raw_action(r#"{"type":"START_NEW_SESSION","payload":{"session_id":"s1","test_type":"AUTO"}}"#)
        .await
        .unwrap();
    assert!(started.is_ok());

    let invalid = state.do_raw_action(r#"{"type":"REBOOT"}"#).await.unwrap();
    assert_eq!(invalid.code, status::BAD_REQUEST);

    let export = state
        .do_raw_action(r#"{"type":"EXPORT_COVERAGE","payload":{"version":"1.0"}}"#)
        .await
        .unwrap();
    assert_eq!(export.code, status::BAD_REQUEST);
    assert_eq!(export.data, json!("Action 'EXPORT_COVERAGE' is not supported!"));

    state
        .process_raw_message(r#"{"type":"SESSION_FINISHED","session_id":"s1"}"#)
        .await
        .unwrap();
    assert!(state.active_scope().active_sessions().is_empty());
    assert!(state.process_raw_message("{").await.is_err());
}

#[tokio::test]
async fn packages_can_be_left_out() {
    let sink = MemorySink::new();
    initialized(memory_client(), sink.clone(), TcovConfig::default().with_send_packages(false)).await;

    assert_eq!(sink.last(&Route::Packages(Target::Build)), Some(json!([])));
    assert_eq!(sink.count(&Route::Package(Target::Build, package_of(SVC).to_string())), 0);
}
