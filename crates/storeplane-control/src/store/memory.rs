//! In-memory store backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{ControlError, ControlResult};
use crate::state::StoreUpdate;
use crate::types::{StoreId, StoreRecord};

use super::{StoreFilter, StoreRepository, UpdateOutcome};

/// In-memory store backend.
///
/// Data is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stores: RwLock<HashMap<String, StoreRecord>>,
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StoreRepository for MemoryStore {
    async fn create(&self, record: &StoreRecord) -> ControlResult<()> {
        let mut stores = self
            .stores
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let key = record.id.as_str().to_owned();
        if stores.contains_key(&key) {
            return Err(ControlError::internal(format!("store {key} already exists")));
        }

        stores.insert(key, record.clone());
        Ok(())
    }

    async fn find(&self, id: &StoreId) -> ControlResult<Option<StoreRecord>> {
        let stores = self
            .stores
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        Ok(stores.get(id.as_str()).cloned())
    }

    async fn list(&self, filter: &StoreFilter) -> ControlResult<Vec<StoreRecord>> {
        let stores = self
            .stores
            .read()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let mut results: Vec<_> = stores
            .values()
            .filter(|r| filter.status.is_none_or(|status| r.status == status))
            .cloned()
            .collect();

        results.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        if let Some(limit) = filter.limit {
            results.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        Ok(results)
    }

    async fn update(&self, id: &StoreId, update: &StoreUpdate) -> ControlResult<UpdateOutcome> {
        let mut stores = self
            .stores
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        let record = stores
            .get_mut(id.as_str())
            .ok_or_else(|| ControlError::StoreNotFound(id.to_string()))?;

        if !update.applies_to(record.status) {
            return Ok(UpdateOutcome::Conflict {
                current: record.status,
            });
        }

        record.status = update.status;
        record.error_message.clone_from(&update.error_message);
        record.updated_at = chrono::Utc::now();

        Ok(UpdateOutcome::Applied(record.clone()))
    }

    async fn delete(&self, id: &StoreId) -> ControlResult<()> {
        let mut stores = self
            .stores
            .write()
            .map_err(|_| ControlError::internal("lock poisoned"))?;

        if stores.remove(id.as_str()).is_none() {
            return Err(ControlError::StoreNotFound(id.to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{StoreStatus, StoreType};

    fn test_store() -> StoreRecord {
        StoreRecord::new("Test Shop".to_owned(), StoreType::WooCommerce, "localhost")
    }

    #[tokio::test]
    async fn create_and_find() {
        let store = MemoryStore::new();
        let record = test_store();
        let id = record.id.clone();

        store.create(&record).await.expect("create failed");

        let retrieved = store
            .find(&id)
            .await
            .expect("find failed")
            .expect("store not found");
        assert_eq!(retrieved, record);
    }

    #[tokio::test]
    async fn duplicate_create_fails() {
        let store = MemoryStore::new();
        let record = test_store();

        store.create(&record).await.expect("first create failed");
        assert!(store.create(&record).await.is_err());
    }

    #[tokio::test]
    async fn conditional_update_applies_from_expected_status() {
        let store = MemoryStore::new();
        let record = test_store();
        let id = record.id.clone();
        store.create(&record).await.expect("create failed");

        let update = StoreUpdate::from_status(
            StoreStatus::Provisioning,
            StoreStatus::Failed,
            Some("helm failed".to_owned()),
        );
        let outcome = store.update(&id, &update).await.expect("update failed");

        let UpdateOutcome::Applied(updated) = outcome else {
            panic!("expected update to apply");
        };
        assert_eq!(updated.status, StoreStatus::Failed);
        assert_eq!(updated.error_message.as_deref(), Some("helm failed"));
        assert!(updated.updated_at >= record.updated_at);
    }

    #[tokio::test]
    async fn conditional_update_reports_conflict() {
        let store = MemoryStore::new();
        let mut record = test_store();
        record.status = StoreStatus::Deleting;
        let id = record.id.clone();
        store.create(&record).await.expect("create failed");

        let update =
            StoreUpdate::from_status(StoreStatus::Provisioning, StoreStatus::Ready, None);
        let outcome = store.update(&id, &update).await.expect("update failed");

        assert_eq!(
            outcome,
            UpdateOutcome::Conflict {
                current: StoreStatus::Deleting
            }
        );
        let unchanged = store.find(&id).await.unwrap().unwrap();
        assert_eq!(unchanged.status, StoreStatus::Deleting);
    }

    #[tokio::test]
    async fn update_nonexistent_fails() {
        let store = MemoryStore::new();
        let update =
            StoreUpdate::from_status(StoreStatus::Provisioning, StoreStatus::Ready, None);

        let result = store.update(&StoreId::new("nonexistent"), &update).await;
        assert!(matches!(result, Err(ControlError::StoreNotFound(_))));
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filterable() {
        let store = MemoryStore::new();

        let first = test_store();
        store.create(&first).await.expect("create failed");
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let mut second = test_store();
        second.status = StoreStatus::Ready;
        store.create(&second).await.expect("create failed");

        let all = store.list_all().await.expect("list failed");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);

        let ready = store
            .list(&StoreFilter::new().with_status(StoreStatus::Ready))
            .await
            .expect("list failed");
        assert_eq!(ready.len(), 1);

        let limited = store
            .list(&StoreFilter::new().with_limit(1))
            .await
            .expect("list failed");
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn delete_removes_record() {
        let store = MemoryStore::new();
        let record = test_store();
        let id = record.id.clone();
        store.create(&record).await.expect("create failed");

        store.delete(&id).await.expect("delete failed");
        assert!(store.find(&id).await.unwrap().is_none());
        assert!(store.delete(&id).await.is_err());
    }
}
