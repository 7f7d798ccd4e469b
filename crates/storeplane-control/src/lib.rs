//! Storeplane Control Plane
//!
//! This crate provisions and tears down isolated "store" deployments on a
//! shared cluster and keeps each store's recorded status consistent with what
//! is actually running.
//!
//! # Architecture
//!
//! The control plane is responsible for:
//!
//! - **Admission control**: a per-client token bucket in front of every
//!   request
//! - **Provisioning**: installing a chart release per store in its own
//!   namespace, with freshly generated database credentials
//! - **Deletion**: uninstalling the release and deleting the namespace
//! - **Reconciliation**: a periodic sweep correcting drift between the
//!   recorded status and the phase the cluster reports
//! - **API surface**: HTTP endpoints for creating, listing, deleting and
//!   probing stores
//!
//! # State Machine
//!
//! Store statuses follow a state machine enforced at compile time using the
//! typestate pattern:
//!
//! ```text
//! Provisioning ──▶ Ready ──────────┐
//!      │                           ▼
//!      ├──────────▶ Failed ──▶ Deleting ──▶ (removed)
//!      │                        ▲    │
//!      └────────────────────────┘    ▼
//!                           DeletionFailed
//! ```
//!
//! Every transition is persisted as a conditional update, so concurrent
//! writers resolve to exactly one winner.
//!
//! # Example
//!
//! ```
//! use storeplane_control::{Provisioning, Store, StoreRecord, StoreStatus, StoreType};
//!
//! let record = StoreRecord::new("Test Shop".to_owned(), StoreType::WooCommerce, "localhost");
//! let store = Store::<Provisioning>::create(record);
//!
//! let ready = store.mark_ready();
//! assert_eq!(ready.status(), StoreStatus::Ready);
//!
//! // Only transitions the lifecycle allows exist:
//! // let invalid = ready.mark_ready(); // Error!
//! let deleting = ready.start_deleting();
//! assert_eq!(deleting.update().expected, vec![StoreStatus::Ready]);
//! ```

#![forbid(unsafe_code)]

pub mod admission;
pub mod api;
pub mod config;
pub mod credentials;
pub mod deployer;
pub mod error;
pub mod health;
pub mod lifecycle;
pub mod pool;
pub mod service;
pub mod state;
pub mod store;
pub mod types;

// Re-export commonly used types at the crate root
pub use admission::AdmissionController;
pub use config::ControlConfig;
pub use deployer::{Deployer, HelmDeployer, MockDeployer, PodPhase, ReleaseSpec};
pub use error::{ControlError, ControlResult};
pub use health::HealthChecker;
pub use lifecycle::{
    CreateStoreRequest, CycleReport, DeletionExecutor, ProvisioningExecutor, Reconciler,
    StoreManager,
};
pub use pool::TaskPool;
pub use service::{ControlPlane, ControlService};
pub use state::{
    AnyStore, Deleting, DeletionFailed, Failed, Provisioning, Ready, Store, StoreState,
    StoreUpdate,
};
pub use store::{MemoryStore, SqliteStore, StoreFilter, StoreRepository, UpdateOutcome};
pub use types::{StoreId, StoreRecord, StoreStatus, StoreType};
