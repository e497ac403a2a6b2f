/// Blob storage
///
/// Stands in for the file storage collaborator: clients reserve a single-use
/// upload slot, PUT the bytes to it, and get back a storage id that later
/// requests refer to. Slots expire after [`UPLOAD_SLOT_TTL_MS`]; uploaded
/// files are kept for [`BLOB_RETENTION_MS`] unless a knowledge document
/// points at them.
use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::now_millis;

/// How long a reserved upload slot accepts a PUT
pub const UPLOAD_SLOT_TTL_MS: i64 = 15 * 60 * 1000;

/// How long user uploads are kept
pub const BLOB_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

/// Stored file
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    pub id: String,
    /// Uploading user; `None` for files stored by the operator
    pub owner_id: Option<String>,
    pub content_type: String,
    pub bytes: Vec<u8>,
    pub created_at: i64,
}

/// Rows removed by [`BlobRepository::prune`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneStats {
    pub slots: u64,
    pub blobs: u64,
}

/// Blob repository for database operations
#[derive(Clone)]
pub struct BlobRepository {
    pool: SqlitePool,
}

impl BlobRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Reserve an upload slot for a user and return its token
    pub async fn reserve_upload(&self, owner_id: &str) -> Result<String> {
        let token = Uuid::new_v4().to_string();

        sqlx::query("INSERT INTO upload_slots (token, owner_id, created_at) VALUES (?, ?, ?)")
            .bind(&token)
            .bind(owner_id)
            .bind(now_millis())
            .execute(&self.pool)
            .await
            .context("Failed to reserve upload slot")?;

        Ok(token)
    }

    /// Consume an upload slot and store the bytes, returning the storage id.
    ///
    /// Used, expired and unknown tokens are all `NotFound`.
    pub async fn upload(&self, token: &str, content_type: &str, bytes: &[u8]) -> Result<String> {
        let now = now_millis();
        let mut tx = self.pool.begin().await.context("Failed to begin upload")?;

        let owner_id: Option<String> = sqlx::query_scalar(
            "SELECT owner_id FROM upload_slots \
             WHERE token = ? AND consumed_at IS NULL AND created_at >= ?",
        )
        .bind(token)
        .bind(now - UPLOAD_SLOT_TTL_MS)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to look up upload slot")?;

        let Some(owner_id) = owner_id else {
            return Err(EngineError::NotFound("Upload slot".to_string()).into());
        };

        let claimed = sqlx::query(
            "UPDATE upload_slots SET consumed_at = ? WHERE token = ? AND consumed_at IS NULL",
        )
        .bind(now)
        .bind(token)
        .execute(&mut *tx)
        .await
        .context("Failed to claim upload slot")?;

        if claimed.rows_affected() == 0 {
            return Err(EngineError::NotFound("Upload slot".to_string()).into());
        }

        let id = self
            .insert(&mut tx, Some(&owner_id), content_type, bytes)
            .await?;
        tx.commit().await.context("Failed to commit upload")?;

        tracing::debug!(storage_id = %id, owner_id = %owner_id, size = bytes.len(), "Stored blob");
        Ok(id)
    }

    /// Store an operator file directly, without an upload slot or owner
    pub async fn put(&self, content_type: &str, bytes: &[u8]) -> Result<String> {
        let mut tx = self.pool.begin().await.context("Failed to begin blob insert")?;
        let id = self.insert(&mut tx, None, content_type, bytes).await?;
        tx.commit().await.context("Failed to commit blob insert")?;
        Ok(id)
    }

    async fn insert(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        owner_id: Option<&str>,
        content_type: &str,
        bytes: &[u8],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            "INSERT INTO blobs (id, owner_id, content_type, bytes, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(owner_id)
        .bind(content_type)
        .bind(bytes)
        .bind(now_millis())
        .execute(&mut **tx)
        .await
        .context("Failed to store blob")?;

        Ok(id)
    }

    pub async fn get(&self, storage_id: &str) -> Result<Option<Blob>> {
        let row = sqlx::query(
            "SELECT id, owner_id, content_type, bytes, created_at FROM blobs WHERE id = ?",
        )
        .bind(storage_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch blob")?;

        Ok(row.map(|r| Blob {
            id: r.get("id"),
            owner_id: r.get("owner_id"),
            content_type: r.get("content_type"),
            bytes: r.get("bytes"),
            created_at: r.get("created_at"),
        }))
    }

    /// Drop consumed or expired slots and user uploads past retention.
    ///
    /// Files referenced by a knowledge document are never removed.
    pub async fn prune(&self, now: i64) -> Result<PruneStats> {
        let slots = sqlx::query(
            "DELETE FROM upload_slots WHERE consumed_at IS NOT NULL OR created_at < ?",
        )
        .bind(now - UPLOAD_SLOT_TTL_MS)
        .execute(&self.pool)
        .await
        .context("Failed to prune upload slots")?;

        let blobs = sqlx::query(
            "DELETE FROM blobs WHERE owner_id IS NOT NULL AND created_at < ? \
             AND id NOT IN (SELECT storage_id FROM knowledge)",
        )
        .bind(now - BLOB_RETENTION_MS)
        .execute(&self.pool)
        .await
        .context("Failed to prune blobs")?;

        let stats = PruneStats {
            slots: slots.rows_affected(),
            blobs: blobs.rows_affected(),
        };
        if stats != PruneStats::default() {
            tracing::debug!(slots = stats.slots, blobs = stats.blobs, "Pruned storage");
        }
        Ok(stats)
    }
}
