//! Common test utilities for control plane integration tests.

#![allow(dead_code)]

pub mod fixtures;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use storeplane_control::config::{AdmissionConfig, ControlConfig};
use storeplane_control::deployer::MockDeployer;
use storeplane_control::{
    ControlPlane, MemoryStore, StoreId, StoreRecord, StoreRepository, StoreStatus,
};

/// Complete test control plane with all components wired together.
pub struct TestControlPlane {
    pub plane: ControlPlane,
    pub deployer: Arc<MockDeployer>,
    pub repository: Arc<dyn StoreRepository>,
}

impl TestControlPlane {
    /// Creates a new test control plane with default configuration.
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    /// Creates a test control plane with a custom admission budget.
    pub fn with_admission(rate: u32, burst: u32) -> Self {
        let mut config = fast_config();
        config.admission = AdmissionConfig {
            rate,
            burst,
            ..AdmissionConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a test control plane from a full configuration.
    pub fn with_config(config: ControlConfig) -> Self {
        let repository: Arc<dyn StoreRepository> = Arc::new(MemoryStore::new());
        let deployer = Arc::new(MockDeployer::new());
        let plane = ControlPlane::new(&config, Arc::clone(&repository), deployer.clone())
            .expect("control plane wiring");

        Self {
            plane,
            deployer,
            repository,
        }
    }

    /// Builds a fresh router over the shared components.
    pub fn router(&self) -> Router {
        self.plane.router()
    }

    /// Polls the repository until the store reaches `status`.
    pub async fn wait_for_status(&self, id: &StoreId, status: StoreStatus) -> StoreRecord {
        for _ in 0..200 {
            if let Some(record) = self.repository.find(id).await.unwrap() {
                if record.status == status {
                    return record;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("store {id} never reached {status}");
    }

    /// Polls the repository until the store is gone.
    pub async fn wait_for_removal(&self, id: &StoreId) {
        for _ in 0..200 {
            if self.repository.find(id).await.unwrap().is_none() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("store {id} was never removed");
    }
}

impl Default for TestControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration with no teardown settle delay.
pub fn fast_config() -> ControlConfig {
    let mut config = ControlConfig::default();
    config.provisioning.teardown_settle_ms = 0;
    config.provisioning.max_concurrent = 4;
    config
}
