//! Risk ledger
//!
//! For each baseline build the ledger keeps every method that was new or
//! modified in some build diffed against that baseline, with the best
//! coverage ever seen and a per-build covered/not-covered history.
//!
//! Updates are read-modify-write of the whole baseline record: the new
//! record is computed in memory and written with a single store call. Two
//! pipelines updating the same baseline concurrently race; the last write
//! wins.

use crate::error::RiskError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tcov_counter::BundleCounter;
use tcov_model::{Count, DiffMethods, Method};
use tcov_store::{Record, StoreClient};

/// Coverage status of a risk in one build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskStatus {
    /// Covered in that build
    Covered,
    /// Not covered in that build
    NotCovered,
}

/// Why a method is a risk
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskType {
    /// Method added since the baseline
    New,
    /// Method changed since the baseline
    Modified,
}

/// A new or modified method and its coverage history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Risk {
    /// The method, in the version that became a risk
    pub method: Method,
    /// Highest coverage seen in any build
    pub coverage: Count,
    /// Status per build version
    pub status: BTreeMap<String, RiskStatus>,
}

impl Risk {
    /// Whether the risk was covered in any build
    #[inline]
    #[must_use]
    pub fn is_covered(&self) -> bool {
        self.status.values().any(|s| *s == RiskStatus::Covered)
    }
}

/// Risks grouped by type
pub type TypedRisks = BTreeMap<RiskType, Vec<Risk>>;

/// The persisted ledger of one baseline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineRisks {
    /// Baseline build id
    pub baseline: String,
    /// Risks ordered by method
    pub risks: Vec<Risk>,
}

impl Record for BaselineRisks {
    const COLLECTION: &'static str = "baseline_risks";

    fn id(&self) -> String {
        self.baseline.clone()
    }
}

impl BaselineRisks {
    /// Empty ledger for a baseline
    #[must_use]
    pub fn empty(baseline: impl Into<String>) -> Self {
        Self {
            baseline: baseline.into(),
            risks: Vec::new(),
        }
    }

    /// Fold one build's diff and coverage into the ledger
    ///
    /// Each new or modified method gets `status[build_version]` set and its
    /// coverage raised to the higher of the stored and the current value.
    /// Statuses recorded for other builds are kept.
    pub fn apply(&mut self, build_version: &str, diff: &DiffMethods, bundle: &BundleCounter) {
        let mut by_method: HashMap<Method, Risk> = std::mem::take(&mut self.risks)
            .into_iter()
            .map(|r| (r.method.clone(), r))
            .collect();

        for method in diff.risks() {
            let coverage = bundle.count_of(&method.key());
            let status = if coverage.is_covered() {
                RiskStatus::Covered
            } else {
                RiskStatus::NotCovered
            };
            by_method
                .entry(method.clone())
                .and_modify(|risk| {
                    risk.coverage = risk.coverage.max(coverage);
                    risk.status.insert(build_version.to_string(), status);
                })
                .or_insert_with(|| Risk {
                    method: method.clone(),
                    coverage,
                    status: BTreeMap::from([(build_version.to_string(), status)]),
                });
        }

        let mut risks: Vec<Risk> = by_method.into_values().collect();
        risks.sort_by(|a, b| a.method.cmp(&b.method));
        self.risks = risks;
    }

    /// Ledger risks split by the diff they are viewed through
    #[must_use]
    pub fn typed(&self, diff: &DiffMethods) -> TypedRisks {
        let pick = |methods: &[Method]| -> Vec<Risk> {
            self.risks
                .iter()
                .filter(|r| methods.contains(&r.method))
                .cloned()
                .collect()
        };
        TypedRisks::from([
            (RiskType::New, pick(&diff.new)),
            (RiskType::Modified, pick(&diff.modified)),
        ])
    }

    /// Risks never covered in any build
    pub fn not_covered(&self) -> impl Iterator<Item = &Risk> {
        self.risks.iter().filter(|r| !r.is_covered())
    }
}

/// Risks never covered in any build, dropping empty groups
#[must_use]
pub fn not_covered(risks: &TypedRisks) -> TypedRisks {
    risks
        .iter()
        .filter_map(|(risk_type, risks)| {
            let uncovered: Vec<Risk> = risks.iter().filter(|r| !r.is_covered()).cloned().collect();
            (!uncovered.is_empty()).then_some((*risk_type, uncovered))
        })
        .collect()
}

/// Number of risks by type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskCounts {
    /// New-method risks
    pub new: usize,
    /// Modified-method risks
    pub modified: usize,
    /// Sum of both
    pub total: usize,
}

impl RiskCounts {
    /// Count typed risks
    #[must_use]
    pub fn of(risks: &TypedRisks) -> Self {
        let count = |t| risks.get(&t).map_or(0, Vec::len);
        let new = count(RiskType::New);
        let modified = count(RiskType::Modified);
        Self {
            new,
            modified,
            total: new + modified,
        }
    }
}

/// Store-backed risk ledger
#[derive(Debug, Clone)]
pub struct RiskLedger {
    client: StoreClient,
}

impl RiskLedger {
    /// Create ledger over a store
    #[inline]
    #[must_use]
    pub fn new(client: StoreClient) -> Self {
        Self { client }
    }

    /// Load the ledger of a baseline, empty if none was stored yet
    ///
    /// # Errors
    /// Returns [`RiskError::Storage`] if the store fails.
    pub async fn load(&self, baseline: &str) -> Result<BaselineRisks, RiskError> {
        self.client
            .find_by_id::<BaselineRisks>(baseline)
            .await
            .map(|found| found.unwrap_or_else(|| BaselineRisks::empty(baseline)))
            .map_err(|e| RiskError::storage(baseline, e))
    }

    /// Update the ledger of `baseline` with one build and return its typed risks
    ///
    /// The returned risks are the full ledger entries (history included) of
    /// the build's new and modified methods. Nothing is written if loading
    /// fails; the update is a single store call.
    ///
    /// Concurrent updates of the same baseline are not serialized: the last
    /// store wins and may drop status entries written in between.
    ///
    /// # Errors
    /// Returns [`RiskError::Storage`] if loading or storing fails. No retry is attempted.
    pub async fn calculate_risks(
        &self,
        build_version: &str,
        diff: &DiffMethods,
        bundle: &BundleCounter,
        baseline: &str,
    ) -> Result<TypedRisks, RiskError> {
        let mut ledger = self.load(baseline).await?;
        ledger.apply(build_version, diff, bundle);
        self.client
            .store(&ledger)
            .await
            .map_err(|e| RiskError::storage(baseline, e))?;

        tracing::info!(
            baseline,
            build = build_version,
            risks = ledger.risks.len(),
            uncovered = ledger.not_covered().count(),
            "Risk ledger updated"
        );
        Ok(ledger.typed(diff))
    }
}
