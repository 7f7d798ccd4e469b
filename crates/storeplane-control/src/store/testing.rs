//! Repository wrapper with switchable storage faults.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::state::StoreUpdate;
use crate::types::{StoreId, StoreRecord};

use super::{MemoryStore, StoreFilter, StoreRepository, UpdateOutcome};

/// A [`MemoryStore`] whose list and delete calls can be made to fail.
#[derive(Debug, Default)]
pub(crate) struct FaultyStore {
    inner: MemoryStore,
    fail_list: AtomicBool,
    fail_delete: AtomicBool,
}

impl FaultyStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn fail_list(&self, fail: bool) {
        self.fail_list.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }
}

fn locked() -> ControlError {
    ControlError::internal("database is locked")
}

#[async_trait]
impl StoreRepository for FaultyStore {
    async fn create(&self, record: &StoreRecord) -> ControlResult<()> {
        self.inner.create(record).await
    }

    async fn find(&self, id: &StoreId) -> ControlResult<Option<StoreRecord>> {
        self.inner.find(id).await
    }

    async fn list(&self, filter: &StoreFilter) -> ControlResult<Vec<StoreRecord>> {
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(locked());
        }
        self.inner.list(filter).await
    }

    async fn update(&self, id: &StoreId, update: &StoreUpdate) -> ControlResult<UpdateOutcome> {
        self.inner.update(id, update).await
    }

    async fn delete(&self, id: &StoreId) -> ControlResult<()> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(locked());
        }
        self.inner.delete(id).await
    }
}
