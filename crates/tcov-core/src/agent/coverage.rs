//! Coverage recompute and reporting of an [`AgentState`]

use super::AgentState;
use crate::context::{Baseline, CoverContext};
use crate::error::CoverageError;
use crate::sink::{Route, Target};
use crate::summary::{
    methods_covered_by_tests, risk_dtos, scope_coverage, AgentSummary, BuildCoverage, CoverageData,
    MethodsSummary, PackageCoverage,
};
use serde_json::Value;
use std::sync::Arc;
use tcov_counter::BundleCounters;
use tcov_model::FinishedSession;
use tcov_session::{enabled, summaries, ActiveScope, ActiveSessions, FinishedScope};

impl AgentState {
    /// Recompute and report coverage of the active scope
    ///
    /// # Errors
    /// Returns [`CoverageError`] if reporting fails.
    pub async fn calculate_and_send_scope_coverage(&self) -> Result<(), CoverageError> {
        let scope = self.active_scope();
        let snapshot = scope.snapshot();
        self.send_scope_coverage(&scope, &snapshot).await
    }

    /// Recompute and report coverage of the build over its enabled scopes
    ///
    /// Updates the risk ledger of the build's baseline. Does nothing before
    /// the coverage context is available.
    ///
    /// Scopes and sessions left pending by failed writes are stored first.
    ///
    /// # Errors
    /// Returns [`CoverageError`] if storing pending data, loading scopes,
    /// updating the ledger or reporting fails.
    pub async fn calculate_and_send_build_coverage(&self) -> Result<(), CoverageError> {
        let Some(context) = self.context() else {
            tracing::debug!(build = %self.build_version, "Build coverage skipped, context not ready");
            return Ok(());
        };
        self.flush_pending().await?;
        let scopes = enabled(self.scopes.by_version(&self.build_version, true).await?);
        self.send_build_coverage(&context, &scopes).await
    }

    pub(super) async fn send_scope_coverage(
        &self,
        scope: &ActiveScope,
        sessions: &[Arc<FinishedSession>],
    ) -> Result<(), CoverageError> {
        let Some(context) = self.context() else {
            tracing::debug!(scope = scope.id(), "Scope coverage skipped, context not ready");
            return Ok(());
        };
        let counters = context.bundle_counters(sessions.iter().map(|s| &**s));
        let coverage = scope_coverage(&counters);
        let summary = scope.update_summary(|s| s.coverage = coverage.clone());
        if !scope.is_finished() {
            self.reporter.send(Route::ActiveScope, &summary).await?;
        }
        self.reporter
            .send(Route::ScopeSummary(scope.id().to_string()), &summary)
            .await?;

        let data = CoverageData::calculate(context.diff(), &counters);
        let target = Target::Scope(scope.id().to_string());
        self.send_coverage(&target, &context, &counters, &data, serde_json::to_value(&coverage)?, &data.methods)
            .await
    }

    /// Coverage of a finished scope, from its stored sessions
    async fn send_finished_scope_coverage(
        &self,
        context: &CoverContext,
        scope: &FinishedScope,
    ) -> Result<(), CoverageError> {
        let counters = context.bundle_counters(scope.sessions());
        let data = CoverageData::calculate(context.diff(), &counters);
        let coverage = serde_json::to_value(scope_coverage(&counters))?;
        self.send_coverage(&Target::Scope(scope.id.clone()), context, &counters, &data, coverage, &data.methods)
            .await
    }

    async fn send_build_coverage(&self, context: &CoverContext, scopes: &[FinishedScope]) -> Result<(), CoverageError> {
        let counters = context.bundle_counters(scopes.iter().flat_map(|s| s.sessions()));
        let risks = self
            .ledger
            .calculate_risks(&self.build_version, context.diff(), &counters.all, context.baseline())
            .await?;
        let data = CoverageData::calculate(context.diff(), &counters);
        let coverage = BuildCoverage::of(&counters, &risks, scopes.len());
        let summary = AgentSummary::of(&self.build_version, &counters, &risks);
        let methods = data.methods.with_risks(summary.risk_counts);

        self.send_coverage(&Target::Build, context, &counters, &data, serde_json::to_value(&coverage)?, &methods)
            .await?;
        self.reporter
            .send(Route::Risks, &risk_dtos(&risks, &data.associated))
            .await?;
        self.reporter.send(Route::Summary, &summary).await?;
        tracing::info!(
            build = %self.build_version,
            coverage = coverage.percentage,
            scopes = scopes.len(),
            risks = summary.risk_counts.total,
            "Build coverage sent"
        );
        Ok(())
    }

    /// Reports shared by scope and build coverage
    ///
    /// Headline reports go out in order; package, associated-test and
    /// per-test reports are fanned out.
    async fn send_coverage(
        &self,
        target: &Target,
        context: &CoverContext,
        counters: &BundleCounters,
        data: &CoverageData,
        coverage: Value,
        methods: &MethodsSummary,
    ) -> Result<(), CoverageError> {
        self.reporter
            .send_value(Route::Coverage(target.clone()), coverage)
            .await?;
        self.reporter.send(Route::Methods(target.clone()), methods).await?;
        self.reporter.send(Route::Tests(target.clone()), &data.tests).await?;
        self.reporter
            .send(Route::TestsSummary(target.clone()), &data.by_tests)
            .await?;

        let packages: &[PackageCoverage] = if self.config.send_packages { &data.packages } else { &[] };
        let listed: Vec<PackageCoverage> = packages.iter().map(PackageCoverage::without_classes).collect();
        self.reporter.send(Route::Packages(target.clone()), &listed).await?;

        let mut reports = Vec::new();
        for package in packages {
            reports.push((
                Route::Package(target.clone(), package.name.clone()),
                serde_json::to_value(package)?,
            ));
        }
        for tests in data.associated.to_dtos() {
            reports.push((
                Route::AssociatedTests(target.clone(), tests.id.clone()),
                serde_json::to_value(&tests)?,
            ));
        }
        for covered in methods_covered_by_tests(&counters.by_test, context.diff()) {
            reports.push((
                Route::MethodsCoveredByTest(target.clone(), covered.summary.id.clone()),
                serde_json::to_value(&covered)?,
            ));
        }
        let sent = self.fan_out.send_all(&self.reporter, reports).await?;
        tracing::debug!(%target, sent, "Coverage reports fanned out");
        Ok(())
    }

    pub(super) async fn process_initialized(&self, context: &CoverContext) -> Result<(), CoverageError> {
        self.reporter
            .send(Route::Parent, &context.parent_version().unwrap_or_default())
            .await?;
        let baseline = self.baseline().await?;
        self.send_baseline(&baseline).await?;

        let scopes = self.scopes.by_version(&self.build_version, true).await?;
        self.reporter.send(Route::FinishedScopes, &summaries(&scopes)).await?;
        for scope in &scopes {
            self.send_finished_scope_coverage(context, scope).await?;
        }

        let active = self.active_scope();
        self.subscribe(&active);
        self.send_active_scope().await?;
        self.send_active_sessions().await?;

        let scopes = enabled(scopes);
        self.send_build_coverage(context, &scopes).await?;
        tracing::info!(agent = %self.agent_id, build = %self.build_version, "Build initialized");
        Ok(())
    }

    pub(super) async fn send_baseline(&self, baseline: &Baseline) -> Result<(), CoverageError> {
        self.reporter.send(Route::Baseline, &baseline.version).await
    }

    pub(super) async fn send_active_scope(&self) -> Result<(), CoverageError> {
        let scope = self.active_scope();
        let summary = scope.summary();
        self.reporter.send(Route::ActiveScope, &summary).await?;
        self.reporter
            .send(Route::ScopeSummary(scope.id().to_string()), &summary)
            .await
    }

    pub(super) async fn send_active_sessions(&self) -> Result<(), CoverageError> {
        let sessions = self.active_scope().active_session_dtos();
        self.reporter
            .send(Route::ActiveSessionSummary, &ActiveSessions::of(&sessions))
            .await?;
        self.reporter.send(Route::ActiveSessions, &sessions).await
    }

    pub(super) async fn send_scopes(&self) -> Result<(), CoverageError> {
        let scopes = self.scopes.by_version(&self.build_version, false).await?;
        self.reporter.send(Route::FinishedScopes, &summaries(&scopes)).await
    }
}
