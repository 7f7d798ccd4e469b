//! Store record storage backends.
//!
//! Records are the single source of truth for lifecycle state. Every status
//! write is a targeted, conditional update of one record; there are no
//! cross-record transactions. An in-memory backend is provided for tests and
//! local runs, and a SQLite backend for durable single-node deployments.

mod memory;
mod sqlite;
#[cfg(test)]
pub(crate) mod testing;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::ControlResult;
use crate::state::StoreUpdate;
use crate::types::{StoreId, StoreRecord, StoreStatus};

/// Filter criteria for listing stores.
#[derive(Debug, Clone, Default)]
pub struct StoreFilter {
    /// Filter by status.
    pub status: Option<StoreStatus>,
    /// Maximum number of results.
    pub limit: Option<u32>,
}

impl StoreFilter {
    /// Create a new empty filter.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            status: None,
            limit: None,
        }
    }

    /// Filter by status.
    #[must_use]
    pub const fn with_status(mut self, status: StoreStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Set maximum results.
    #[must_use]
    pub const fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Result of a conditional update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The write was applied; carries the record after the write.
    Applied(StoreRecord),
    /// The record was not in an expected status; nothing was written.
    Conflict {
        /// Status found at write time.
        current: StoreStatus,
    },
}

impl UpdateOutcome {
    /// Whether the write was applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Backend for storing store records.
///
/// Implementations must support concurrent callers and apply each
/// [`StoreUpdate`] atomically: the status check and the write of status,
/// error message and `updated_at` happen as one step.
#[async_trait]
pub trait StoreRepository: Send + Sync {
    /// Insert a new store record.
    ///
    /// Returns an error if a store with the same ID already exists.
    async fn create(&self, record: &StoreRecord) -> ControlResult<()>;

    /// Get a store by ID.
    async fn find(&self, id: &StoreId) -> ControlResult<Option<StoreRecord>>;

    /// List stores matching the filter, newest first.
    async fn list(&self, filter: &StoreFilter) -> ControlResult<Vec<StoreRecord>>;

    /// List every store, newest first.
    async fn list_all(&self) -> ControlResult<Vec<StoreRecord>> {
        self.list(&StoreFilter::new()).await
    }

    /// Apply a conditional status write.
    ///
    /// Returns [`crate::ControlError::StoreNotFound`] if the record is absent.
    async fn update(&self, id: &StoreId, update: &StoreUpdate) -> ControlResult<UpdateOutcome>;

    /// Delete a store record.
    async fn delete(&self, id: &StoreId) -> ControlResult<()>;
}
