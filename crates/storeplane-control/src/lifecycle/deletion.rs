//! Tears down a store marked `Deleting`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::deployer::Deployer;
use crate::error::ControlResult;
use crate::state::{Deleting, Store};
use crate::store::{StoreRepository, UpdateOutcome};

/// Outcome of a teardown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionOutcome {
    /// Resources are gone and the record was removed.
    Removed,
    /// Namespace deletion or record removal failed; the record is kept as
    /// `DeletionFailed`.
    Failed,
}

/// Uninstalls the release and deletes the namespace of a store.
pub struct DeletionExecutor {
    repository: Arc<dyn StoreRepository>,
    deployer: Arc<dyn Deployer>,
    settle: Duration,
}

impl DeletionExecutor {
    /// Create a new deletion executor.
    ///
    /// `settle` is the pause between release uninstall and namespace
    /// deletion.
    pub fn new(
        repository: Arc<dyn StoreRepository>,
        deployer: Arc<dyn Deployer>,
        settle: Duration,
    ) -> Self {
        Self {
            repository,
            deployer,
            settle,
        }
    }

    /// Tear the store down and persist the outcome.
    ///
    /// The caller must already have persisted `Deleting`.
    pub async fn execute(&self, store: Store<Deleting>) -> ControlResult<DeletionOutcome> {
        let store_id = store.id().clone();
        let namespace = store.record().namespace.clone();

        info!(store_id = %store_id, namespace = %namespace, "deleting store");

        // The release name is the namespace.
        match self.deployer.teardown(&namespace, &namespace).await {
            Ok(()) => info!(store_id = %store_id, namespace = %namespace, "release uninstalled"),
            Err(e) => warn!(
                store_id = %store_id,
                namespace = %namespace,
                error = %e,
                "release uninstall failed; deleting namespace anyway"
            ),
        }

        if !self.settle.is_zero() {
            tokio::time::sleep(self.settle).await;
        }

        if let Err(e) = self.deployer.delete_namespace(&namespace).await {
            error!(store_id = %store_id, namespace = %namespace, error = %e, "namespace deletion failed");
            return self
                .record_failure(store, format!("Failed to delete namespace: {e}"))
                .await;
        }

        if let Err(e) = self.repository.delete(&store_id).await {
            error!(store_id = %store_id, namespace = %namespace, error = %e, "store record removal failed");
            return self
                .record_failure(store, format!("Failed to remove store record: {e}"))
                .await;
        }

        info!(store_id = %store_id, namespace = %namespace, "store deleted");
        Ok(DeletionOutcome::Removed)
    }

    /// Persist `DeletionFailed` so the store can be deleted again.
    async fn record_failure(
        &self,
        store: Store<Deleting>,
        message: String,
    ) -> ControlResult<DeletionOutcome> {
        let store_id = store.id().clone();
        let update = store.fail_deletion(message).update();
        if let UpdateOutcome::Conflict { current } =
            self.repository.update(&store_id, &update).await?
        {
            warn!(store_id = %store_id, status = %current, "store changed during deletion");
        }
        Ok(DeletionOutcome::Failed)
    }
}

impl std::fmt::Debug for DeletionExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionExecutor")
            .field("settle", &self.settle)
            .finish_non_exhaustive()
    }
}
