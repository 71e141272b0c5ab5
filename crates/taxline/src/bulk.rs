//! Bulk refresh over a list of businesses.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{info, instrument};

use taxline_core::{RefreshReport, Refresher, Rut};

/// Refreshes each business in order, one at a time, and partitions the results.
///
/// The report keeps the input order within each side.
pub async fn refresh_all(refresher: &dyn Refresher, ruts: &[Rut]) -> RefreshReport {
    let mut report = RefreshReport::new();
    for rut in ruts {
        let outcome = refresher.refresh_outcome(rut).await;
        report.record(rut.clone(), outcome);
    }
    report
}

/// Refreshes a fixed list of businesses.
#[derive(Clone)]
pub struct BulkRefreshJob {
    refresher: Arc<dyn Refresher>,
    ruts: Vec<Rut>,
}

impl std::fmt::Debug for BulkRefreshJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkRefreshJob")
            .field("ruts", &self.ruts)
            .finish_non_exhaustive()
    }
}

impl BulkRefreshJob {
    /// Create a job over the given businesses.
    #[must_use]
    pub fn new(refresher: Arc<dyn Refresher>, ruts: Vec<Rut>) -> Self {
        Self { refresher, ruts }
    }

    /// Businesses this job refreshes.
    #[must_use]
    pub fn ruts(&self) -> &[Rut] {
        &self.ruts
    }

    /// Runs the job to completion.
    #[instrument(skip(self), fields(count = self.ruts.len()))]
    pub async fn run(&self) -> RefreshReport {
        info!("Starting bulk cache refresh");
        let report = refresh_all(self.refresher.as_ref(), &self.ruts).await;
        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "Bulk cache refresh finished"
        );
        report
    }

    /// Runs the job on its own task. The caller may drop the handle.
    pub fn spawn(&self) -> JoinHandle<RefreshReport> {
        let job = self.clone();
        tokio::spawn(async move { job.run().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use taxline_core::RefreshOutcome;

    /// Fails for every rut listed in `missing`, recording call order.
    #[derive(Default)]
    struct ScriptedRefresher {
        missing: Vec<Rut>,
        calls: Mutex<Vec<Rut>>,
    }

    #[async_trait]
    impl Refresher for ScriptedRefresher {
        async fn refresh_outcome(&self, rut: &Rut) -> RefreshOutcome {
            self.calls.lock().unwrap().push(rut.clone());
            if self.missing.contains(rut) {
                RefreshOutcome::SkippedNoData
            } else {
                RefreshOutcome::Stored
            }
        }
    }

    fn ruts(values: &[&str]) -> Vec<Rut> {
        values.iter().copied().map(Rut::new).collect()
    }

    #[tokio::test]
    async fn test_refresh_all_partitions_in_order() {
        let refresher = ScriptedRefresher {
            missing: ruts(&["B"]),
            ..Default::default()
        };

        let report = refresh_all(&refresher, &ruts(&["A", "B", "C"])).await;

        assert_eq!(report.succeeded, ruts(&["A", "C"]));
        assert_eq!(report.failed, ruts(&["B"]));
        assert_eq!(*refresher.calls.lock().unwrap(), ruts(&["A", "B", "C"]));
    }

    #[tokio::test]
    async fn test_spawned_job_reports() {
        let refresher = Arc::new(ScriptedRefresher {
            missing: ruts(&["76222222-2"]),
            ..Default::default()
        });
        let job = BulkRefreshJob::new(
            refresher,
            ruts(&["76111111-1", "76222222-2", "76637851-k"]),
        );

        let report = job.spawn().await.unwrap();
        assert_eq!(report.total(), 3);
        assert_eq!(report.failed, ruts(&["76222222-2"]));
    }

    #[tokio::test]
    async fn test_empty_list() {
        let job = BulkRefreshJob::new(Arc::new(ScriptedRefresher::default()), Vec::new());
        assert_eq!(job.run().await, RefreshReport::new());
    }
}
