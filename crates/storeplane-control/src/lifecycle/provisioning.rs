//! Drives a new store from `Provisioning` to `Ready` or `Failed`.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::config::ProvisioningConfig;
use crate::credentials::StoreCredentials;
use crate::deployer::{Deployer, ReleaseSpec};
use crate::error::ControlResult;
use crate::state::{Provisioning, Store};
use crate::store::{StoreRepository, UpdateOutcome};
use crate::types::{StoreRecord, StoreStatus};

/// Runs the external deployment for freshly created stores.
pub struct ProvisioningExecutor {
    repository: Arc<dyn StoreRepository>,
    deployer: Arc<dyn Deployer>,
    config: ProvisioningConfig,
}

impl ProvisioningExecutor {
    /// Create a new provisioning executor.
    pub fn new(
        repository: Arc<dyn StoreRepository>,
        deployer: Arc<dyn Deployer>,
        config: ProvisioningConfig,
    ) -> Self {
        Self {
            repository,
            deployer,
            config,
        }
    }

    /// Build the release for a store, with freshly generated credentials.
    pub fn release_for(&self, record: &StoreRecord) -> ControlResult<ReleaseSpec> {
        let credentials = StoreCredentials::generate()?;
        let host = record.host(&self.config.domain_suffix);

        Ok(ReleaseSpec {
            release: record.namespace.clone(),
            namespace: record.namespace.clone(),
            chart: self.config.chart_path(record.store_type),
            values_file: self.config.values_file(record.store_type),
            values: vec![
                ("ingress.hosts[0].host".to_owned(), host),
                (
                    "mariadb.auth.rootPassword".to_owned(),
                    credentials.root_password,
                ),
                (
                    "mariadb.auth.password".to_owned(),
                    credentials.db_password.clone(),
                ),
                ("wordpress.db.password".to_owned(), credentials.db_password),
                (
                    "wordpress.password".to_owned(),
                    self.config.admin_password.clone(),
                ),
            ],
        })
    }

    /// Deploy the store and persist the outcome.
    ///
    /// Returns the status that was written, or `None` if the store started
    /// deleting while the deployment ran and the result was discarded.
    /// Deployment failures are recorded on the store, not returned.
    pub async fn execute(&self, store: Store<Provisioning>) -> ControlResult<Option<StoreStatus>> {
        let store_id = store.id().clone();
        let namespace = store.record().namespace.clone();

        info!(
            store_id = %store_id,
            namespace = %namespace,
            store_type = %store.record().store_type,
            "provisioning store"
        );

        let result = match self.release_for(store.record()) {
            Ok(release) => self.deployer.deploy(&release, self.config.timeout()).await,
            Err(e) => Err(e),
        };

        // The reconciler may have moved the store while the deploy ran; the
        // deploy result still wins over anything but the teardown path.
        let update = match result {
            Ok(()) => {
                info!(store_id = %store_id, namespace = %namespace, "store provisioned");
                store.mark_ready().update()
            }
            Err(e) => {
                error!(store_id = %store_id, namespace = %namespace, error = %e, "provisioning failed");
                store.fail(e.to_string()).update()
            }
        }
        .or_from([StoreStatus::Ready, StoreStatus::Failed]);

        match self.repository.update(&store_id, &update).await? {
            UpdateOutcome::Applied(record) => Ok(Some(record.status)),
            UpdateOutcome::Conflict { current } => {
                warn!(
                    store_id = %store_id,
                    status = %current,
                    "store is being deleted; deployment result discarded"
                );
                Ok(None)
            }
        }
    }
}

impl std::fmt::Debug for ProvisioningExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningExecutor")
            .field("domain_suffix", &self.config.domain_suffix)
            .finish_non_exhaustive()
    }
}
