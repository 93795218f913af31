//! Bounded fan-out of independent reports

use crate::error::CoverageError;
use crate::sink::{Reporter, Route};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Worker pool delivering reports concurrently, in no particular order
#[derive(Debug, Clone)]
pub struct FanOut {
    permits: Arc<Semaphore>,
    workers: usize,
}

impl FanOut {
    /// Create pool with `workers` concurrent deliveries (at least one)
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            permits: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    /// Pool size
    #[inline]
    #[must_use]
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Deliver every report and wait for all of them
    ///
    /// A failed delivery does not stop the others.
    ///
    /// # Errors
    /// Returns the first failure after all deliveries have finished.
    pub async fn send_all(
        &self,
        reporter: &Reporter,
        reports: impl IntoIterator<Item = (Route, Value)>,
    ) -> Result<usize, CoverageError> {
        let mut jobs = JoinSet::new();
        for (route, payload) in reports {
            let permits = Arc::clone(&self.permits);
            let reporter = reporter.clone();
            jobs.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| CoverageError::Job("fan-out pool closed".into()))?;
                reporter.send_value(route, payload).await
            });
        }

        let mut sent = 0;
        let mut first_error = None;
        while let Some(joined) = jobs.join_next().await {
            let result = joined.unwrap_or_else(|e| Err(CoverageError::Job(e.to_string())));
            match result {
                Ok(()) => sent += 1,
                Err(e) => {
                    tracing::warn!(error = %e, "Report delivery failed");
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(sent),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{MemorySink, ReportSink, SinkError, Target};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn delivers_everything() {
        let sink = MemorySink::new();
        let reporter = Reporter::new("1.0", sink.clone());
        let reports = (0..20).map(|n| (Route::Package(Target::Build, format!("p{n}")), json!(n)));

        let sent = FanOut::new(3).send_all(&reporter, reports).await.unwrap();
        assert_eq!(sent, 20);
        assert_eq!(sink.len(), 20);
    }

    struct Gauge {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ReportSink for Gauge {
        async fn send(&self, _: &str, route: Route, _: Value) -> Result<(), SinkError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            if route == Route::Risks {
                return Err(SinkError::Unavailable("risks".into()));
            }
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_pool_size_and_reports_failures() {
        let gauge = Arc::new(Gauge {
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let reporter = Reporter::new("1.0", gauge.clone());
        let mut reports: Vec<(Route, Value)> = (0..12).map(|n| (Route::Tests(Target::Build), json!(n))).collect();
        reports.push((Route::Risks, json!([])));

        let result = FanOut::new(2).send_all(&reporter, reports).await;
        assert!(matches!(result, Err(CoverageError::Report(SinkError::Unavailable(_)))));
        assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(gauge.current.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn pool_has_at_least_one_worker() {
        assert_eq!(FanOut::new(0).workers(), 1);
    }
}
