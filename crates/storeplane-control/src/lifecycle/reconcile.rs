//! Periodic drift correction between persisted status and workload phase.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::deployer::{Deployer, PodPhase};
use crate::error::ControlResult;
use crate::state::drift_correction;
use crate::store::{StoreRepository, UpdateOutcome};
use crate::types::{StoreRecord, StoreStatus};

/// Status a store is expected to have given its workload phase.
///
/// | phase     | expected       |
/// |-----------|----------------|
/// | `Running` | `Ready`        |
/// | `Pending` | `Provisioning` |
/// | `Failed`  | `Failed`       |
/// | `Unknown` | `Provisioning` |
///
/// Any other phase carries no expectation.
#[must_use]
pub const fn expected_status(phase: &PodPhase) -> Option<StoreStatus> {
    match phase {
        PodPhase::Running => Some(StoreStatus::Ready),
        PodPhase::Pending | PodPhase::Unknown => Some(StoreStatus::Provisioning),
        PodPhase::Failed => Some(StoreStatus::Failed),
        PodPhase::Succeeded | PodPhase::Other(_) => None,
    }
}

/// Counters from one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Stores whose phase was queried.
    pub checked: usize,
    /// Stores skipped because they are being deleted.
    pub skipped: usize,
    /// Corrections written.
    pub corrected: usize,
    /// Corrections lost to a concurrent writer.
    pub conflicts: usize,
    /// Stores whose phase query or write failed.
    pub errors: usize,
}

/// Reconciliation loop.
pub struct Reconciler {
    repository: Arc<dyn StoreRepository>,
    deployer: Arc<dyn Deployer>,
    interval: Duration,
}

impl Reconciler {
    /// Create a reconciler running every `interval`.
    pub fn new(
        repository: Arc<dyn StoreRepository>,
        deployer: Arc<dyn Deployer>,
        interval: Duration,
    ) -> Self {
        Self {
            repository,
            deployer,
            interval,
        }
    }

    /// Run one sweep over all stores.
    pub async fn run_cycle(&self) -> ControlResult<CycleReport> {
        let stores = self.repository.list_all().await?;
        let mut report = CycleReport::default();

        for store in stores {
            if store.status.is_deleting() {
                report.skipped += 1;
                continue;
            }

            report.checked += 1;
            match self.reconcile_store(&store).await {
                Ok(Some(true)) => report.corrected += 1,
                Ok(Some(false)) => report.conflicts += 1,
                Ok(None) => {}
                Err(e) => {
                    report.errors += 1;
                    warn!(store_id = %store.id, error = %e, "failed to reconcile store");
                }
            }
        }

        debug!(?report, "reconciliation cycle finished");
        Ok(report)
    }

    /// Returns `None` without drift, `Some(applied)` after a write attempt.
    async fn reconcile_store(&self, store: &StoreRecord) -> ControlResult<Option<bool>> {
        let phase = self
            .deployer
            .query_phase(&store.namespace, store.store_type.pod_selector())
            .await?;

        let Some(expected) = expected_status(&phase) else {
            return Ok(None);
        };
        let Some(update) = drift_correction(store.status, expected) else {
            return Ok(None);
        };

        match self.repository.update(&store.id, &update).await? {
            UpdateOutcome::Applied(_) => {
                info!(
                    store_id = %store.id,
                    from = %store.status,
                    to = %expected,
                    phase = %phase,
                    "corrected status drift"
                );
                Ok(Some(true))
            }
            UpdateOutcome::Conflict { current } => {
                debug!(store_id = %store.id, status = %current, "drift correction superseded");
                Ok(Some(false))
            }
        }
    }

    /// Spawn the loop. It runs a cycle every interval until `cancel` fires.
    pub fn start(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = self.interval.as_secs(), "reconciliation loop started");

            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;

                    () = cancel.cancelled() => {
                        info!("reconciliation loop shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_cycle().await {
                            warn!(error = %e, "reconciliation cycle failed");
                        }
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}
