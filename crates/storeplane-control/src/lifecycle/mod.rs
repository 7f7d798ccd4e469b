//! Store lifecycle orchestration.
//!
//! Three drivers move stores through the state machine in [`crate::state`]:
//!
//! - [`ProvisioningExecutor`] takes a new store to `Ready` or `Failed`.
//! - [`DeletionExecutor`] tears a `Deleting` store down and removes it, or
//!   parks it in `DeletionFailed`.
//! - [`Reconciler`] periodically corrects drift between the persisted status
//!   and the phase the cluster reports.
//!
//! Each of them writes through conditional updates, so they can race each
//! other without ever overwriting a transition they did not observe.
//! [`StoreManager`] is the entry point used by the HTTP layer.

mod deletion;
mod manager;
mod provisioning;
mod reconcile;

pub use deletion::{DeletionExecutor, DeletionOutcome};
pub use manager::{CreateStoreRequest, StoreHealth, StoreManager};
pub use provisioning::ProvisioningExecutor;
pub use reconcile::{CycleReport, Reconciler, expected_status};
