//! Report delivery
//!
//! Reports are plain JSON values addressed by a [`Route`]. The transport that
//! carries them is a [`ReportSink`] implemented by the embedding host;
//! [`MemorySink`] keeps them in memory.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// What a coverage report belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    /// The whole build
    Build,
    /// One scope
    Scope(String),
}

impl Display for Target {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Build => write!(f, "/build"),
            Self::Scope(id) => write!(f, "/build/scopes/{id}"),
        }
    }
}

/// Destination of a report
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Route {
    /// Summary of the active scope
    ActiveScope,
    /// Live sessions of the active scope
    ActiveSessions,
    /// Count and test types of the live sessions
    ActiveSessionSummary,
    /// Summaries of finished scopes
    FinishedScopes,
    /// Summary of one scope
    ScopeSummary(String),
    /// Coverage figures
    Coverage(Target),
    /// Method counts by classification
    Methods(Target),
    /// Package list without classes
    Packages(Target),
    /// One package with its classes
    Package(Target, String),
    /// Per-test coverage
    Tests(Target),
    /// Test aggregates
    TestsSummary(Target),
    /// Tests of one method, by coverage id
    AssociatedTests(Target, String),
    /// Methods covered by one test, by test id
    MethodsCoveredByTest(Target, String),
    /// Risks of the build
    Risks,
    /// Headline figures of the build
    Summary,
    /// Current baseline build
    Baseline,
    /// Build the current one is diffed against
    Parent,
}

impl Display for Route {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveScope => write!(f, "/active-scope"),
            Self::ActiveSessions => write!(f, "/active-scope/sessions"),
            Self::ActiveSessionSummary => write!(f, "/active-scope/summary/active-sessions"),
            Self::FinishedScopes => write!(f, "/build/scopes/finished"),
            Self::ScopeSummary(id) => write!(f, "/build/scopes/{id}"),
            Self::Coverage(t) => write!(f, "{t}/coverage"),
            Self::Methods(t) => write!(f, "{t}/methods"),
            Self::Packages(t) => write!(f, "{t}/coverage/packages"),
            Self::Package(t, name) => write!(f, "{t}/coverage/packages/{name}"),
            Self::Tests(t) => write!(f, "{t}/tests"),
            Self::TestsSummary(t) => write!(f, "{t}/summary/tests"),
            Self::AssociatedTests(t, id) => write!(f, "{t}/associated-tests/{id}"),
            Self::MethodsCoveredByTest(t, id) => write!(f, "{t}/tests/{id}/methods"),
            Self::Risks => write!(f, "/build/risks"),
            Self::Summary => write!(f, "/build/summary"),
            Self::Baseline => write!(f, "/data/baseline"),
            Self::Parent => write!(f, "/data/parent"),
        }
    }
}

/// Report delivery errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Sink no longer accepts reports
    #[error("report sink closed")]
    Closed,

    /// Sink could not take the report now
    #[error("report sink unavailable: {0}")]
    Unavailable(String),
}

impl SinkError {
    /// Check if delivery may succeed later
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Transport for reports
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Deliver one report of a build
    async fn send(&self, build_version: &str, route: Route, payload: Value) -> Result<(), SinkError>;
}

/// Sends reports of one build through a sink
#[derive(Clone)]
pub struct Reporter {
    build_version: Arc<str>,
    sink: Arc<dyn ReportSink>,
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("build_version", &self.build_version)
            .finish_non_exhaustive()
    }
}

impl Reporter {
    /// Create reporter for a build
    #[must_use]
    pub fn new(build_version: &str, sink: Arc<dyn ReportSink>) -> Self {
        Self {
            build_version: Arc::from(build_version),
            sink,
        }
    }

    /// Build the reports belong to
    #[inline]
    #[must_use]
    pub fn build_version(&self) -> &str {
        &self.build_version
    }

    /// Encode and send a report
    ///
    /// # Errors
    /// Returns [`crate::CoverageError`] if encoding or delivery fails.
    pub async fn send<T: Serialize + ?Sized>(&self, route: Route, message: &T) -> Result<(), crate::CoverageError> {
        let payload = serde_json::to_value(message)?;
        self.send_value(route, payload).await
    }

    /// Send an encoded report
    ///
    /// # Errors
    /// Returns [`crate::CoverageError::Report`] if delivery fails.
    pub async fn send_value(&self, route: Route, payload: Value) -> Result<(), crate::CoverageError> {
        tracing::trace!(build = %self.build_version, %route, "Sending report");
        self.sink.send(&self.build_version, route, payload).await?;
        Ok(())
    }
}

/// A delivered report
#[derive(Debug, Clone, PartialEq)]
pub struct Report {
    /// Build version
    pub build_version: String,
    /// Destination
    pub route: Route,
    /// Encoded message
    pub payload: Value,
}

/// Sink that keeps every report in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Report>>,
}

impl MemorySink {
    /// Create empty sink
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every report in delivery order
    #[must_use]
    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    /// Latest payload sent to `route`
    #[must_use]
    pub fn last(&self, route: &Route) -> Option<Value> {
        self.reports
            .lock()
            .iter()
            .rev()
            .find(|r| &r.route == route)
            .map(|r| r.payload.clone())
    }

    /// Number of reports sent to `route`
    #[must_use]
    pub fn count(&self, route: &Route) -> usize {
        self.reports.lock().iter().filter(|r| &r.route == route).count()
    }

    /// Number of reports
    #[must_use]
    pub fn len(&self) -> usize {
        self.reports.lock().len()
    }

    /// Whether nothing was sent
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reports.lock().is_empty()
    }

    /// Forget every report
    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

#[async_trait]
impl ReportSink for MemorySink {
    async fn send(&self, build_version: &str, route: Route, payload: Value) -> Result<(), SinkError> {
        self.reports.lock().push(Report {
            build_version: build_version.to_string(),
            route,
            payload,
        });
        Ok(())
    }
}
