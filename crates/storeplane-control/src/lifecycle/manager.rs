//! Entry points for store lifecycle operations.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::{ControlError, ControlResult};
use crate::health::HealthChecker;
use crate::pool::TaskPool;
use crate::state::{AnyStore, Store};
use crate::store::{StoreRepository, UpdateOutcome};
use crate::types::{StoreId, StoreRecord, StoreStatus, StoreType, validate_store_name};

use super::{DeletionExecutor, ProvisioningExecutor};

/// Request to create a new store.
#[derive(Debug, Clone)]
pub struct CreateStoreRequest {
    /// Requested display name.
    pub name: String,
    /// Requested template name.
    pub store_type: String,
}

/// Result of a store health probe.
#[derive(Debug)]
pub struct StoreHealth {
    /// Persisted status at probe time.
    pub status: StoreStatus,
    /// Probe result; `Err` is inconclusive.
    pub probe: ControlResult<bool>,
}

/// Orchestrates store lifecycle operations.
///
/// Request paths validate, persist the first transition and hand the slow
/// external work to the task pool, so they never wait on the cluster.
pub struct StoreManager {
    repository: Arc<dyn StoreRepository>,
    pool: TaskPool,
    provisioner: Arc<ProvisioningExecutor>,
    deleter: Arc<DeletionExecutor>,
    health: HealthChecker,
    domain_suffix: String,
}

impl StoreManager {
    /// Create a new store manager.
    pub fn new(
        repository: Arc<dyn StoreRepository>,
        pool: TaskPool,
        provisioner: Arc<ProvisioningExecutor>,
        deleter: Arc<DeletionExecutor>,
        health: HealthChecker,
        domain_suffix: String,
    ) -> Self {
        Self {
            repository,
            pool,
            provisioner,
            deleter,
            health,
            domain_suffix,
        }
    }

    /// Validate and persist a new store, then start provisioning it.
    ///
    /// Returns the store as persisted, in `Provisioning`.
    pub async fn create(&self, request: CreateStoreRequest) -> ControlResult<StoreRecord> {
        let name = validate_store_name(&request.name)?;
        let store_type: StoreType = request.store_type.parse()?;

        let record = StoreRecord::new(name, store_type, &self.domain_suffix);
        self.repository.create(&record).await?;

        info!(
            store_id = %record.id,
            namespace = %record.namespace,
            store_type = %store_type,
            "store created"
        );

        let store = Store::create(record.clone());
        let provisioner = Arc::clone(&self.provisioner);
        if let Err(e) = self.pool.submit("provision", &record.id, async move {
            provisioner.execute(store).await.map(drop)
        }) {
            // Nothing will ever provision it; drop the record.
            if let Err(cleanup) = self.repository.delete(&record.id).await {
                warn!(store_id = %record.id, error = %cleanup, "failed to remove unprovisioned store");
            }
            return Err(e);
        }

        Ok(record)
    }

    /// Mark a store `Deleting` and start tearing it down.
    ///
    /// Of two concurrent deletes exactly one wins; the other gets
    /// [`ControlError::AlreadyDeleting`].
    pub async fn delete(&self, id: &StoreId) -> ControlResult<()> {
        let record = self.get(id).await?;
        let deleting = AnyStore::from_record(record.clone()).start_deleting()?;
        let rollback = deleting.rollback(&record);

        match self.repository.update(id, &deleting.update()).await? {
            UpdateOutcome::Applied(_) => {}
            UpdateOutcome::Conflict { current } => {
                warn!(store_id = %id, status = %current, "lost delete race");
                return Err(if current == StoreStatus::Deleting {
                    ControlError::AlreadyDeleting(id.to_string())
                } else {
                    ControlError::InvalidStateTransition {
                        from: current.as_str(),
                        to: StoreStatus::Deleting.as_str(),
                    }
                });
            }
        }

        info!(store_id = %id, "store deletion started");

        let deleter = Arc::clone(&self.deleter);
        if let Err(e) = self.pool.submit("delete", id, async move {
            deleter.execute(deleting).await.map(drop)
        }) {
            warn!(store_id = %id, status = %record.status, error = %e, "teardown not started; restoring status");
            if let Err(restore) = self.repository.update(id, &rollback).await {
                warn!(store_id = %id, error = %restore, "failed to restore status");
            }
            return Err(e);
        }

        Ok(())
    }

    /// Get a store by ID.
    pub async fn get(&self, id: &StoreId) -> ControlResult<StoreRecord> {
        self.repository
            .find(id)
            .await?
            .ok_or_else(|| ControlError::StoreNotFound(id.to_string()))
    }

    /// List every store, newest first.
    pub async fn list(&self) -> ControlResult<Vec<StoreRecord>> {
        self.repository.list_all().await
    }

    /// Probe a store's public endpoint.
    pub async fn health(&self, id: &StoreId) -> ControlResult<StoreHealth> {
        let record = self.get(id).await?;
        let probe = self.health.probe(&record).await;
        Ok(StoreHealth {
            status: record.status,
            probe,
        })
    }

    /// Number of lifecycle jobs queued or running.
    #[must_use]
    pub fn jobs_in_flight(&self) -> usize {
        self.pool.in_flight()
    }

    /// Stop accepting jobs and wait for running ones.
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}

impl std::fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager")
            .field("domain_suffix", &self.domain_suffix)
            .finish_non_exhaustive()
    }
}
