/// Knowledge documents
///
/// At most one `core_methodology` document exists; replacing it is a single
/// transaction so readers see either the old or the new one.
use anyhow::{Context, Result};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

const CORE_METHODOLOGY: &str = "core_methodology";

/// Knowledge document record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeDoc {
    pub id: String,
    pub doc_type: String,
    pub description: String,
    pub storage_id: String,
}

/// Knowledge repository for database operations
#[derive(Clone)]
pub struct KnowledgeRepository {
    pool: SqlitePool,
}

impl KnowledgeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Replace the core methodology document with the given stored file
    pub async fn set_core_methodology(
        &self,
        storage_id: &str,
        description: &str,
    ) -> Result<KnowledgeDoc> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin methodology transaction")?;

        let row = sqlx::query("SELECT content_type, bytes FROM blobs WHERE id = ?")
            .bind(storage_id)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to look up methodology file")?;
        let Some(row) = row else {
            return Err(EngineError::NotFound("Stored file".to_string()).into());
        };

        let content_type: String = row.get("content_type");
        let bytes: Vec<u8> = row.get("bytes");
        check_methodology_file(&content_type, &bytes)?;

        let removed = sqlx::query("DELETE FROM knowledge WHERE doc_type = ?")
            .bind(CORE_METHODOLOGY)
            .execute(&mut *tx)
            .await
            .context("Failed to remove previous methodology")?;

        let doc = KnowledgeDoc {
            id: Uuid::new_v4().to_string(),
            doc_type: CORE_METHODOLOGY.to_string(),
            description: description.to_string(),
            storage_id: storage_id.to_string(),
        };

        sqlx::query("INSERT INTO knowledge (id, doc_type, description, storage_id) VALUES (?, ?, ?, ?)")
            .bind(&doc.id)
            .bind(&doc.doc_type)
            .bind(&doc.description)
            .bind(&doc.storage_id)
            .execute(&mut *tx)
            .await
            .context("Failed to insert methodology")?;

        tx.commit()
            .await
            .context("Failed to commit methodology transaction")?;

        tracing::info!(
            replaced = removed.rows_affected(),
            storage_id,
            "Core methodology updated"
        );
        Ok(doc)
    }

    /// The active core methodology document, if any
    pub async fn core_methodology(&self) -> Result<Option<KnowledgeDoc>> {
        let row = sqlx::query(
            "SELECT id, doc_type, description, storage_id FROM knowledge WHERE doc_type = ?",
        )
        .bind(CORE_METHODOLOGY)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch core methodology")?;

        Ok(row.map(|r| KnowledgeDoc {
            id: r.get("id"),
            doc_type: r.get("doc_type"),
            description: r.get("description"),
            storage_id: r.get("storage_id"),
        }))
    }

    /// Text of the active core methodology document, if any
    pub async fn core_methodology_text(&self) -> Result<Option<String>> {
        let bytes: Option<Vec<u8>> = sqlx::query_scalar(
            "SELECT b.bytes FROM knowledge k JOIN blobs b ON b.id = k.storage_id WHERE k.doc_type = ?",
        )
        .bind(CORE_METHODOLOGY)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch core methodology text")?;

        bytes
            .map(|b| {
                String::from_utf8(b).map_err(|_| {
                    EngineError::Storage("Core methodology file is not valid UTF-8".to_string())
                        .into()
                })
            })
            .transpose()
    }
}

/// The methodology is injected into every prompt, so it must be readable text
fn check_methodology_file(content_type: &str, bytes: &[u8]) -> Result<(), EngineError> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !essence.starts_with("text/") {
        return Err(EngineError::InvalidInput(format!(
            "Methodology file must be text, got '{}'",
            content_type
        )));
    }

    match std::str::from_utf8(bytes) {
        Ok(text) if !text.trim().is_empty() => Ok(()),
        Ok(_) => Err(EngineError::InvalidInput("Methodology file is empty".to_string())),
        Err(_) => Err(EngineError::InvalidInput(
            "Methodology file is not valid UTF-8".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::check_methodology_file;
    use crate::db::Database;
    use sdk::errors::EngineError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_replace_keeps_single_document() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let knowledge = db.knowledge();

        assert!(knowledge.core_methodology_text().await.unwrap().is_none());

        let first = db.blobs().put("text/plain", b"Use CBT.").await.unwrap();
        knowledge.set_core_methodology(&first, "v1").await.unwrap();
        let second = db.blobs().put("text/plain", b"Use ACT.").await.unwrap();
        let doc = knowledge.set_core_methodology(&second, "v2").await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM knowledge")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(count, 1);

        let active = knowledge.core_methodology().await.unwrap().unwrap();
        assert_eq!(active, doc);
        assert_eq!(
            knowledge.core_methodology_text().await.unwrap().as_deref(),
            Some("Use ACT.")
        );
    }

    #[tokio::test]
    async fn test_unknown_storage_id_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();

        assert!(db
            .knowledge()
            .set_core_methodology("missing", "v1")
            .await
            .is_err());
    }

    #[test]
    fn test_methodology_file_checks() {
        assert!(check_methodology_file("text/plain", b"Use CBT.").is_ok());
        assert!(check_methodology_file("text/markdown; charset=utf-8", b"# CBT").is_ok());
        assert!(check_methodology_file("audio/webm", b"Use CBT.").is_err());
        assert!(check_methodology_file("text/plain", &[0xff, 0xfe, 0x00, 0x81]).is_err());
        assert!(check_methodology_file("text/plain", b"  \n").is_err());
    }

    #[tokio::test]
    async fn test_binary_file_rejected_and_previous_kept() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let knowledge = db.knowledge();

        let text = db.blobs().put("text/plain", b"Use CBT.").await.unwrap();
        knowledge.set_core_methodology(&text, "v1").await.unwrap();

        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let token = db.blobs().reserve_upload(&user.id).await.unwrap();
        let audio = db
            .blobs()
            .upload(&token, "audio/webm", &[0xff, 0xfe, 0x00, 0x81])
            .await
            .unwrap();

        let err = knowledge.set_core_methodology(&audio, "v2").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidInput(_))
        ));
        assert_eq!(
            knowledge.core_methodology_text().await.unwrap().as_deref(),
            Some("Use CBT.")
        );
    }
}
