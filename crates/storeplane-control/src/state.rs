//! Typestate pattern for the store lifecycle state machine.
//!
//! Store statuses are encoded in the type system so that executors can only
//! take the transitions the lifecycle allows:
//!
//! ```text
//!                 ┌──────────── Deleting ◀───────────┐
//!                 │                │   ▲             │
//!                 ▼                ▼   │             │
//! Provisioning ──▶ Ready      DeletionFailed      Failed
//!      │                                             ▲
//!      └─────────────────────────────────────────────┘
//! ```
//!
//! Every transition yields a [`StoreUpdate`] that is conditional on the
//! status the transition started from, so a concurrent writer that moved the
//! record first turns the write into a reported conflict instead of a blind
//! overwrite.
//!
//! Drift corrections made by the reconciler are decided at runtime by
//! [`drift_correction`], because the observed status is only known after
//! loading the record.

use std::marker::PhantomData;

use crate::error::{ControlError, ControlResult};
use crate::types::{StoreId, StoreRecord, StoreStatus};

// =============================================================================
// State marker types (zero-sized)
// =============================================================================

/// Marker trait for store states.
pub trait StoreState: private::Sealed + Send + Sync {
    /// Get the persisted status representation.
    fn status() -> StoreStatus;
}

mod private {
    pub trait Sealed {}
}

/// External deployment in progress.
#[derive(Debug, Clone, Copy)]
pub struct Provisioning;

/// Deployment succeeded.
#[derive(Debug, Clone, Copy)]
pub struct Ready;

/// Deployment failed.
#[derive(Debug, Clone, Copy)]
pub struct Failed;

/// Teardown in progress.
#[derive(Debug, Clone, Copy)]
pub struct Deleting;

/// Teardown failed.
#[derive(Debug, Clone, Copy)]
pub struct DeletionFailed;

impl private::Sealed for Provisioning {}
impl private::Sealed for Ready {}
impl private::Sealed for Failed {}
impl private::Sealed for Deleting {}
impl private::Sealed for DeletionFailed {}

impl StoreState for Provisioning {
    fn status() -> StoreStatus {
        StoreStatus::Provisioning
    }
}

impl StoreState for Ready {
    fn status() -> StoreStatus {
        StoreStatus::Ready
    }
}

impl StoreState for Failed {
    fn status() -> StoreStatus {
        StoreStatus::Failed
    }
}

impl StoreState for Deleting {
    fn status() -> StoreStatus {
        StoreStatus::Deleting
    }
}

impl StoreState for DeletionFailed {
    fn status() -> StoreStatus {
        StoreStatus::DeletionFailed
    }
}

// =============================================================================
// Status writes
// =============================================================================

/// A single atomic status write.
///
/// Status, error message and `updated_at` are written together, and only if
/// the current status is one of `expected`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreUpdate {
    /// Statuses the record must be in for the write to apply.
    pub expected: Vec<StoreStatus>,
    /// New status.
    pub status: StoreStatus,
    /// New error message; `None` clears it.
    pub error_message: Option<String>,
}

impl StoreUpdate {
    /// Create an update conditional on a single current status.
    #[must_use]
    pub fn from_status(
        from: StoreStatus,
        status: StoreStatus,
        error_message: Option<String>,
    ) -> Self {
        Self {
            expected: vec![from],
            status,
            error_message,
        }
    }

    /// Also apply the write when the record is in one of `statuses`.
    #[must_use]
    pub fn or_from(mut self, statuses: impl IntoIterator<Item = StoreStatus>) -> Self {
        for status in statuses {
            if !self.expected.contains(&status) {
                self.expected.push(status);
            }
        }
        self
    }

    /// Whether the update applies to a record currently in `current`.
    #[must_use]
    pub fn applies_to(&self, current: StoreStatus) -> bool {
        self.expected.contains(&current)
    }
}

// =============================================================================
// Store struct parameterised by state
// =============================================================================

/// A store in a specific lifecycle state.
#[derive(Debug)]
pub struct Store<S: StoreState> {
    record: StoreRecord,
    /// Status this value was transitioned from.
    from: StoreStatus,
    _state: PhantomData<S>,
}

impl<S: StoreState> Store<S> {
    /// Get a reference to the store record.
    #[must_use]
    pub const fn record(&self) -> &StoreRecord {
        &self.record
    }

    /// Get the store ID.
    #[must_use]
    pub const fn id(&self) -> &StoreId {
        &self.record.id
    }

    /// Get the current status.
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        S::status()
    }

    /// The conditional write that persists the last transition.
    #[must_use]
    pub fn update(&self) -> StoreUpdate {
        StoreUpdate::from_status(
            self.from,
            S::status(),
            self.record.error_message.clone(),
        )
    }

    /// Convert into the underlying record.
    #[must_use]
    pub fn into_record(self) -> StoreRecord {
        self.record
    }

    fn transition_with<T: StoreState>(mut self, f: impl FnOnce(&mut StoreRecord)) -> Store<T> {
        f(&mut self.record);
        self.record.status = T::status();
        self.record.updated_at = chrono::Utc::now();
        Store {
            record: self.record,
            from: S::status(),
            _state: PhantomData,
        }
    }

    fn start_deleting_inner(self) -> Store<Deleting> {
        self.transition_with(|_| {})
    }
}

impl Store<Provisioning> {
    /// Wrap a freshly created record.
    #[must_use]
    pub fn create(mut record: StoreRecord) -> Self {
        record.status = StoreStatus::Provisioning;
        Self {
            record,
            from: StoreStatus::Provisioning,
            _state: PhantomData,
        }
    }

    /// External deployment succeeded.
    #[must_use]
    pub fn mark_ready(self) -> Store<Ready> {
        self.transition_with(|record| record.error_message = None)
    }

    /// External deployment failed.
    #[must_use]
    pub fn fail(self, error: String) -> Store<Failed> {
        self.transition_with(|record| record.error_message = Some(error))
    }

    /// A delete request arrived while provisioning.
    #[must_use]
    pub fn start_deleting(self) -> Store<Deleting> {
        self.start_deleting_inner()
    }
}

impl Store<Ready> {
    /// A delete request arrived.
    #[must_use]
    pub fn start_deleting(self) -> Store<Deleting> {
        self.start_deleting_inner()
    }
}

impl Store<Failed> {
    /// A delete request arrived.
    #[must_use]
    pub fn start_deleting(self) -> Store<Deleting> {
        self.start_deleting_inner()
    }
}

impl Store<DeletionFailed> {
    /// An operator re-issued the delete.
    #[must_use]
    pub fn start_deleting(self) -> Store<Deleting> {
        self.start_deleting_inner()
    }
}

impl Store<Deleting> {
    /// Namespace teardown failed.
    #[must_use]
    pub fn fail_deletion(self, error: String) -> Store<DeletionFailed> {
        self.transition_with(|record| record.error_message = Some(error))
    }

    /// The write that undoes the mark when teardown could not be started.
    ///
    /// Restores the status and error message of `previous`, the record as it
    /// was loaded before the delete request.
    #[must_use]
    pub fn rollback(&self, previous: &StoreRecord) -> StoreUpdate {
        StoreUpdate::from_status(
            StoreStatus::Deleting,
            previous.status,
            previous.error_message.clone(),
        )
    }
}

// =============================================================================
// Loading from persisted state
// =============================================================================

/// A type-erased store that can be in any state.
///
/// Used when loading from storage, where the status is not known at compile
/// time.
#[derive(Debug)]
pub enum AnyStore {
    /// Store in provisioning state.
    Provisioning(Store<Provisioning>),
    /// Store in ready state.
    Ready(Store<Ready>),
    /// Store in failed state.
    Failed(Store<Failed>),
    /// Store in deleting state.
    Deleting(Store<Deleting>),
    /// Store in deletion-failed state.
    DeletionFailed(Store<DeletionFailed>),
}

impl AnyStore {
    /// Create an `AnyStore` from a persisted record.
    #[must_use]
    pub fn from_record(record: StoreRecord) -> Self {
        let from = record.status;
        match record.status {
            StoreStatus::Provisioning => Self::Provisioning(Store {
                record,
                from,
                _state: PhantomData,
            }),
            StoreStatus::Ready => Self::Ready(Store {
                record,
                from,
                _state: PhantomData,
            }),
            StoreStatus::Failed => Self::Failed(Store {
                record,
                from,
                _state: PhantomData,
            }),
            StoreStatus::Deleting => Self::Deleting(Store {
                record,
                from,
                _state: PhantomData,
            }),
            StoreStatus::DeletionFailed => Self::DeletionFailed(Store {
                record,
                from,
                _state: PhantomData,
            }),
        }
    }

    /// Get a reference to the store record.
    #[must_use]
    pub const fn record(&self) -> &StoreRecord {
        match self {
            Self::Provisioning(s) => s.record(),
            Self::Ready(s) => s.record(),
            Self::Failed(s) => s.record(),
            Self::Deleting(s) => s.record(),
            Self::DeletionFailed(s) => s.record(),
        }
    }

    /// Get the current status.
    #[must_use]
    pub const fn status(&self) -> StoreStatus {
        match self {
            Self::Provisioning(_) => StoreStatus::Provisioning,
            Self::Ready(_) => StoreStatus::Ready,
            Self::Failed(_) => StoreStatus::Failed,
            Self::Deleting(_) => StoreStatus::Deleting,
            Self::DeletionFailed(_) => StoreStatus::DeletionFailed,
        }
    }

    /// Try to extract a provisioning store.
    pub fn try_into_provisioning(self) -> ControlResult<Store<Provisioning>> {
        match self {
            Self::Provisioning(s) => Ok(s),
            other => Err(ControlError::InvalidStateTransition {
                from: other.status().as_str(),
                to: StoreStatus::Provisioning.as_str(),
            }),
        }
    }

    /// Begin deletion from whatever state the store is in.
    ///
    /// Fails with [`ControlError::AlreadyDeleting`] if a deletion is already in
    /// flight.
    pub fn start_deleting(self) -> ControlResult<Store<Deleting>> {
        match self {
            Self::Provisioning(s) => Ok(s.start_deleting()),
            Self::Ready(s) => Ok(s.start_deleting()),
            Self::Failed(s) => Ok(s.start_deleting()),
            Self::DeletionFailed(s) => Ok(s.start_deleting()),
            Self::Deleting(s) => Err(ControlError::AlreadyDeleting(s.id().to_string())),
        }
    }
}

// =============================================================================
// Drift corrections
// =============================================================================

/// Decide the write that corrects drift from `current` toward `expected`.
///
/// Returns `None` when no write is allowed. Stores owned by the teardown path
/// are never corrected, and a store that reached `Ready` or `Failed` is never
/// moved back to `Provisioning`.
#[must_use]
pub fn drift_correction(current: StoreStatus, expected: StoreStatus) -> Option<StoreUpdate> {
    if current == expected || current.is_deleting() {
        return None;
    }

    let error_message = match (current, expected) {
        (StoreStatus::Provisioning | StoreStatus::Failed, StoreStatus::Ready) => None,
        (StoreStatus::Provisioning | StoreStatus::Ready, StoreStatus::Failed) => {
            Some("store workload reported phase Failed".to_owned())
        }
        _ => return None,
    };

    Some(StoreUpdate::from_status(current, expected, error_message))
}
