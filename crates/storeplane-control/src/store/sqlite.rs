//! SQLite store implementation.

use std::str::FromStr;

use async_trait::async_trait;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};

use crate::error::{ControlError, ControlResult};
use crate::state::StoreUpdate;
use crate::types::{StoreId, StoreRecord, StoreStatus, StoreType};

use super::{StoreFilter, StoreRepository, UpdateOutcome};

const STORE_COLUMNS: &str =
    "id, name, store_type, status, namespace, url, error_message, created_at, updated_at";

/// SQLite-backed store repository.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open the database at `url` and create a new store.
    ///
    /// The database file and the required tables are created if they don't
    /// exist. In-memory URLs get a single pinned connection so every query
    /// sees the same database.
    pub async fn new(url: &str) -> ControlResult<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        let pool = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        Self::from_pool(pool).await
    }

    /// Create a store from an existing connection pool.
    pub async fn from_pool(pool: SqlitePool) -> ControlResult<Self> {
        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Check the database answers queries.
    pub async fn ping(&self) -> ControlResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn ensure_schema(&self) -> ControlResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stores (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                store_type TEXT NOT NULL,
                status TEXT NOT NULL,
                namespace TEXT NOT NULL UNIQUE,
                url TEXT NOT NULL,
                error_message TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_stores_created_at
            ON stores (created_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn row_to_record(row: &SqliteRow) -> ControlResult<StoreRecord> {
        let id: String = row.try_get("id")?;
        let type_str: String = row.try_get("store_type")?;
        let status_str: String = row.try_get("status")?;

        let store_type = StoreType::from_str(&type_str).map_err(|_| {
            ControlError::Serialisation(format!("unknown store type '{type_str}' for store {id}"))
        })?;

        let status = StoreStatus::from_str(&status_str).map_err(|e| {
            ControlError::Serialisation(format!("failed to parse status '{status_str}': {e}"))
        })?;

        Ok(StoreRecord {
            id: StoreId::new(id),
            name: row.try_get("name")?,
            store_type,
            status,
            namespace: row.try_get("namespace")?,
            url: row.try_get("url")?,
            error_message: row.try_get("error_message")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn current_status(&self, id: &StoreId) -> ControlResult<Option<StoreStatus>> {
        let row = sqlx::query("SELECT status FROM stores WHERE id = ?")
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| {
            let status: String = r.try_get("status")?;
            status
                .parse()
                .map_err(|e: String| ControlError::Serialisation(e))
        })
        .transpose()
    }
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl StoreRepository for SqliteStore {
    async fn create(&self, record: &StoreRecord) -> ControlResult<()> {
        sqlx::query(&format!(
            "INSERT INTO stores ({STORE_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(record.id.as_str())
        .bind(&record.name)
        .bind(record.store_type.as_str())
        .bind(record.status.as_str())
        .bind(&record.namespace)
        .bind(&record.url)
        .bind(&record.error_message)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find(&self, id: &StoreId) -> ControlResult<Option<StoreRecord>> {
        let row = sqlx::query(&format!("SELECT {STORE_COLUMNS} FROM stores WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_record).transpose()
    }

    async fn list(&self, filter: &StoreFilter) -> ControlResult<Vec<StoreRecord>> {
        let limit = filter.limit.map_or(-1, i64::from);

        let rows = sqlx::query(&format!(
            r#"
            SELECT {STORE_COLUMNS}
            FROM stores
            WHERE (?1 IS NULL OR status = ?1)
            ORDER BY created_at DESC
            LIMIT ?2
            "#
        ))
        .bind(filter.status.map(|s| s.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn update(&self, id: &StoreId, update: &StoreUpdate) -> ControlResult<UpdateOutcome> {
        if update.expected.is_empty() {
            return Err(ControlError::internal("conditional update without expected status"));
        }

        let placeholders = vec!["?"; update.expected.len()].join(", ");
        let sql = format!(
            r#"
            UPDATE stores
            SET status = ?, error_message = ?, updated_at = ?
            WHERE id = ? AND status IN ({placeholders})
            RETURNING {STORE_COLUMNS}
            "#
        );

        let mut query = sqlx::query(&sql)
            .bind(update.status.as_str())
            .bind(&update.error_message)
            .bind(chrono::Utc::now())
            .bind(id.as_str());
        for status in &update.expected {
            query = query.bind(status.as_str());
        }

        if let Some(row) = query.fetch_optional(&self.pool).await? {
            return Ok(UpdateOutcome::Applied(Self::row_to_record(&row)?));
        }

        match self.current_status(id).await? {
            Some(current) => Ok(UpdateOutcome::Conflict { current }),
            None => Err(ControlError::StoreNotFound(id.to_string())),
        }
    }

    async fn delete(&self, id: &StoreId) -> ControlResult<()> {
        let result = sqlx::query("DELETE FROM stores WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ControlError::StoreNotFound(id.to_string()));
        }

        Ok(())
    }
}
