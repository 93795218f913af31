//! Risk ledger updates across builds

use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use tcov_counter::{bundle, BundleCounter, ClassRegistry};
use tcov_model::{diff, Count, ExecClassData, Method};
use tcov_risk::{not_covered, RiskCounts, RiskError, RiskLedger, RiskStatus, RiskType};
use tcov_test_utils::{class, exec, memory_client, method, registry, FaultyStore};

const SVC: &str = "com/acme/Svc";

fn build_registry(m2_hash: &str) -> ClassRegistry {
    registry([class(SVC)
        .method("m1", "h1", &[2])
        .method("m2", m2_hash, &[4, 6])])
}

fn coverage(registry: &ClassRegistry, hits: &[u32]) -> BundleCounter {
    bundle("all", registry, &[exec(SVC, 3, hits)])
}

fn no_coverage(registry: &ClassRegistry) -> BundleCounter {
    bundle("all", registry, &Vec::<ExecClassData>::new())
}

/// Baseline has m1 only; m2 is new in builds 1.0 and 1.1.
#[tokio::test]
async fn risk_history_across_builds() {
    let ledger = RiskLedger::new(memory_client());
    let baseline = vec![method(SVC, "m1", "h1")];
    let registry = build_registry("h2");
    let changes = diff(&registry.methods(), &baseline);
    assert_eq!(changes.new, vec![method(SVC, "m2", "h2")]);

    let risks = ledger
        .calculate_risks("1.0", &changes, &no_coverage(&registry), "0.9")
        .await
        .unwrap();
    let m2 = &risks[&RiskType::New][0];
    assert_eq!(m2.coverage, Count::new(0, 10));
    assert_eq!(m2.status, BTreeMap::from([("1.0".to_string(), RiskStatus::NotCovered)]));
    assert_eq!(not_covered(&risks)[&RiskType::New].len(), 1);

    let risks = ledger
        .calculate_risks("1.1", &changes, &coverage(&registry, &[1, 2]), "0.9")
        .await
        .unwrap();
    let m2 = &risks[&RiskType::New][0];
    assert_eq!(m2.coverage, Count::new(10, 10));
    assert_eq!(
        m2.status,
        BTreeMap::from([
            ("1.0".to_string(), RiskStatus::NotCovered),
            ("1.1".to_string(), RiskStatus::Covered),
        ])
    );
    assert!(not_covered(&risks).is_empty());

    let stored = ledger.load("0.9").await.unwrap();
    assert_eq!(stored.risks.len(), 1);
    assert_eq!(stored.not_covered().count(), 0);
}

#[tokio::test]
async fn coverage_never_decreases() {
    let ledger = RiskLedger::new(memory_client());
    let registry = build_registry("h2");
    let changes = diff(&registry.methods(), &[]);

    let runs: [&[u32]; 4] = [&[1], &[], &[1, 2], &[2]];
    let mut best = 0;
    for (n, hits) in runs.iter().enumerate() {
        let risks = ledger
            .calculate_risks(&format!("1.{n}"), &changes, &coverage(&registry, hits), "base")
            .await
            .unwrap();
        let m2 = risks[&RiskType::New]
            .iter()
            .find(|r| r.method.name == "m2")
            .unwrap();
        assert!(m2.coverage.covered >= best);
        best = m2.coverage.covered;
    }
    assert_eq!(best, 10);
}

#[tokio::test]
async fn modified_method_is_a_separate_risk() {
    let ledger = RiskLedger::new(memory_client());
    let baseline = vec![method(SVC, "m1", "h1"), method(SVC, "m2", "old")];

    let first = build_registry("v1");
    let changes = diff(&first.methods(), &baseline);
    assert_eq!(changes.modified.len(), 1);
    ledger
        .calculate_risks("1.0", &changes, &coverage(&first, &[1]), "base")
        .await
        .unwrap();

    let second = build_registry("v2");
    let changes = diff(&second.methods(), &baseline);
    let risks = ledger
        .calculate_risks("1.1", &changes, &no_coverage(&second), "base")
        .await
        .unwrap();

    let modified = &risks[&RiskType::Modified];
    assert_eq!(modified.len(), 1);
    assert_eq!(modified[0].method.hash, "v2");
    assert_eq!(modified[0].coverage, Count::new(0, 10));
    assert!(risks[&RiskType::New].is_empty());

    // the ledger keeps the covered first version too
    let stored = ledger.load("base").await.unwrap();
    assert_eq!(stored.risks.len(), 2);
    assert_eq!(RiskCounts::of(&risks), RiskCounts { new: 0, modified: 1, total: 1 });
}

#[tokio::test]
async fn baselines_are_independent() {
    let ledger = RiskLedger::new(memory_client());
    let registry = build_registry("h2");
    let changes = diff(&registry.methods(), &[]);

    ledger
        .calculate_risks("1.0", &changes, &coverage(&registry, &[0, 1, 2]), "a")
        .await
        .unwrap();
    let risks = ledger
        .calculate_risks("1.0", &changes, &no_coverage(&registry), "b")
        .await
        .unwrap();

    assert_eq!(not_covered(&risks)[&RiskType::New].len(), 2);
    assert_eq!(ledger.load("a").await.unwrap().not_covered().count(), 0);
}

#[tokio::test]
async fn storage_failures_propagate_without_partial_writes() {
    let store = FaultyStore::new();
    let ledger = RiskLedger::new(store.client());
    let registry = build_registry("h2");
    let changes = diff(&registry.methods(), &[]);
    let counter = no_coverage(&registry);

    store.fail_reads(true);
    let err = ledger
        .calculate_risks("1.0", &changes, &counter, "base")
        .await
        .unwrap_err();
    assert!(matches!(err, RiskError::Storage { ref baseline, .. } if baseline == "base"));
    assert!(err.is_retryable());
    assert_eq!(store.writes(), 0);

    store.fail_reads(false);
    ledger
        .calculate_risks("1.0", &changes, &counter, "base")
        .await
        .unwrap();
    assert_eq!(store.writes(), 1);

    store.fail_writes(true);
    assert!(ledger
        .calculate_risks("1.1", &changes, &coverage(&registry, &[0]), "base")
        .await
        .is_err());
    store.fail_writes(false);

    let stored = ledger.load("base").await.unwrap();
    assert!(stored.risks.iter().all(|r| !r.status.contains_key("1.1")));
}

#[test]
fn lambda_helpers_never_become_risks() {
    let registry = registry([class(SVC)
        .method("run", "h", &[1])
        .method("lambda$run$0", "hl", &[1])]);
    let changes = diff(&registry.methods(), &Vec::<Method>::new());

    let mut ledger = tcov_risk::BaselineRisks::empty("base");
    ledger.apply("1.0", &changes, &no_coverage(&registry));
    assert_eq!(ledger.risks.len(), 1);
    assert_eq!(ledger.risks[0].method.name, "run");
}
