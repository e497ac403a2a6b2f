/// Transcript store
///
/// Append-only log of conversational turns. Ordering is by `(timestamp, id)`
/// so two turns written in the same millisecond keep their insertion order.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::{decode_json, encode_json, now_millis};

/// Speaker of a transcript chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "assistant" => Role::Assistant,
            _ => Role::User,
        }
    }
}

/// One turn of a session transcript
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptChunk {
    pub id: i64,
    pub session_id: String,
    pub user_id: String,
    pub timestamp: i64,
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vad_events: Option<serde_json::Value>,
}

fn chunk_from_row(r: &SqliteRow) -> TranscriptChunk {
    let role: String = r.get("role");
    TranscriptChunk {
        id: r.get("id"),
        session_id: r.get("session_id"),
        user_id: r.get("user_id"),
        timestamp: r.get("timestamp"),
        role: Role::from_db(&role),
        content: r.get("content"),
        vad_events: decode_json(r.get("vad_events")),
    }
}

/// Transcript repository for database operations
#[derive(Clone)]
pub struct TranscriptRepository {
    pool: SqlitePool,
}

impl TranscriptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append a turn to a session's transcript
    pub async fn append(
        &self,
        session_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
        vad_events: Option<&serde_json::Value>,
    ) -> Result<TranscriptChunk> {
        let timestamp = now_millis();
        let vad = encode_json(vad_events)?;

        let result = sqlx::query(
            "INSERT INTO transcript_chunks (session_id, user_id, timestamp, role, content, vad_events) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(timestamp)
        .bind(role.as_str())
        .bind(content)
        .bind(vad)
        .execute(&self.pool)
        .await
        .context("Failed to append transcript chunk")?;

        tracing::debug!(session_id, role = role.as_str(), "Appended transcript chunk");

        Ok(TranscriptChunk {
            id: result.last_insert_rowid(),
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            timestamp,
            role,
            content: content.to_string(),
            vad_events: vad_events.cloned(),
        })
    }

    /// The most recent `limit` turns, newest first
    pub async fn recent(&self, session_id: &str, limit: i64) -> Result<Vec<TranscriptChunk>> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, timestamp, role, content, vad_events \
             FROM transcript_chunks WHERE session_id = ? \
             ORDER BY timestamp DESC, id DESC LIMIT ?",
        )
        .bind(session_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch recent transcript chunks")?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    /// The whole transcript, oldest first
    pub async fn list(&self, session_id: &str) -> Result<Vec<TranscriptChunk>> {
        let rows = sqlx::query(
            "SELECT id, session_id, user_id, timestamp, role, content, vad_events \
             FROM transcript_chunks WHERE session_id = ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch transcript")?;

        Ok(rows.iter().map(chunk_from_row).collect())
    }

    pub async fn count(&self, session_id: &str) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM transcript_chunks WHERE session_id = ?")
                .bind(session_id)
                .fetch_one(&self.pool)
                .await
                .context("Failed to count transcript chunks")?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, Database, String, String) {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let session = db.sessions().create(&user.id).await.unwrap();
        (temp_dir, db, user.id, session.id)
    }

    #[tokio::test]
    async fn test_append_keeps_insertion_order() {
        let (_dir, db, user_id, session_id) = setup().await;
        let transcripts = db.transcripts();

        for i in 0..5 {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            transcripts
                .append(&session_id, &user_id, role, &format!("turn {}", i), None)
                .await
                .unwrap();
        }

        let all = transcripts.list(&session_id).await.unwrap();
        let contents: Vec<_> = all.iter().map(|c| c.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);

        let recent = transcripts.recent(&session_id, 2).await.unwrap();
        assert_eq!(recent[0].content, "turn 4");
        assert_eq!(recent[1].content, "turn 3");
    }

    #[tokio::test]
    async fn test_unknown_session_rejected() {
        let (_dir, db, user_id, _session_id) = setup().await;

        let result = db
            .transcripts()
            .append("missing", &user_id, Role::User, "hello", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_vad_events_round_trip() {
        let (_dir, db, user_id, session_id) = setup().await;
        let transcripts = db.transcripts();
        let vad = serde_json::json!([{"start": 0.1, "end": 1.4}]);

        transcripts
            .append(&session_id, &user_id, Role::User, "hi", Some(&vad))
            .await
            .unwrap();

        let all = transcripts.list(&session_id).await.unwrap();
        assert_eq!(all[0].vad_events, Some(vad));
        assert_eq!(transcripts.count(&session_id).await.unwrap(), 1);
    }
}
