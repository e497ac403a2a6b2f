/// Session persistence operations
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_json, encode_json, now_millis};

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Active => "active",
            SessionStatus::Completed => "completed",
        }
    }

    fn from_db(s: &str) -> Self {
        match s {
            "completed" => SessionStatus::Completed,
            _ => SessionStatus::Active,
        }
    }
}

/// Session record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub start_time: i64,
    pub end_time: Option<i64>,
    pub status: SessionStatus,
    pub session_summary: Option<String>,
    pub insight_notes: Option<Vec<String>>,
    pub generated_planner_entry_ids: Option<Vec<String>>,
    /// Set once every finalizer step has succeeded
    pub finalized_at: Option<i64>,
}

const SESSION_COLUMNS: &str = "id, user_id, start_time, end_time, status, session_summary, \
     insight_notes, generated_planner_entry_ids, finalized_at";

fn session_from_row(r: &SqliteRow) -> Session {
    let status: String = r.get("status");
    Session {
        id: r.get("id"),
        user_id: r.get("user_id"),
        start_time: r.get("start_time"),
        end_time: r.get("end_time"),
        status: SessionStatus::from_db(&status),
        session_summary: r.get("session_summary"),
        insight_notes: decode_json(r.get("insight_notes")),
        generated_planner_entry_ids: decode_json(r.get("generated_planner_entry_ids")),
        finalized_at: r.get("finalized_at"),
    }
}

/// Session repository for database operations
#[derive(Clone)]
pub struct SessionRepository {
    pool: SqlitePool,
}

impl SessionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create an active session for a user
    pub async fn create(&self, user_id: &str) -> Result<Session> {
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            start_time: now_millis(),
            end_time: None,
            status: SessionStatus::Active,
            session_summary: None,
            insight_notes: None,
            generated_planner_entry_ids: None,
            finalized_at: None,
        };

        sqlx::query("INSERT INTO sessions (id, user_id, start_time, status) VALUES (?, ?, ?, ?)")
            .bind(&session.id)
            .bind(&session.user_id)
            .bind(session.start_time)
            .bind(session.status.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to create session")?;

        Ok(session)
    }

    /// Get a session by ID
    pub async fn get(&self, session_id: &str) -> Result<Option<Session>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM sessions WHERE id = ?",
            SESSION_COLUMNS
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch session")?;

        Ok(row.as_ref().map(session_from_row))
    }

    /// List a user's sessions, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<Session>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM sessions WHERE user_id = ? ORDER BY start_time DESC, rowid DESC",
            SESSION_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list sessions")?;

        Ok(rows.iter().map(session_from_row).collect())
    }

    /// Store the summary and close the session in a single statement.
    ///
    /// Status, summary and end time change together, so readers never observe
    /// a completed session without an end time.
    pub async fn complete_with_summary(&self, session_id: &str, summary: &str) -> Result<i64> {
        let end_time = now_millis();

        sqlx::query(
            "UPDATE sessions SET session_summary = ?, status = ?, end_time = ? WHERE id = ?",
        )
        .bind(summary)
        .bind(SessionStatus::Completed.as_str())
        .bind(end_time)
        .bind(session_id)
        .execute(&self.pool)
        .await
        .context("Failed to complete session")?;

        Ok(end_time)
    }

    /// Record the planner entries generated for this session
    pub async fn record_planner_entries(&self, session_id: &str, entry_ids: &[String]) -> Result<()> {
        sqlx::query("UPDATE sessions SET generated_planner_entry_ids = ? WHERE id = ?")
            .bind(encode_json(Some(&entry_ids))?)
            .bind(session_id)
            .execute(&self.pool)
            .await
            .context("Failed to record generated planner entries")?;

        Ok(())
    }

    /// Mark a completed session as fully finalized
    pub async fn mark_finalized(&self, session_id: &str) -> Result<()> {
        sqlx::query("UPDATE sessions SET finalized_at = ? WHERE id = ? AND status = ?")
            .bind(now_millis())
            .bind(session_id)
            .bind(SessionStatus::Completed.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to mark session finalized")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::db::{Database, SessionStatus};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_create_and_complete_session() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let sessions = db.sessions();

        let session = sessions.create(&user.id).await.unwrap();
        assert_eq!(session.status, SessionStatus::Active);
        assert!(session.end_time.is_none());

        sessions
            .complete_with_summary(&session.id, "You talked about work.")
            .await
            .unwrap();

        let stored = sessions.get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SessionStatus::Completed);
        assert!(stored.end_time.is_some());
        assert_eq!(stored.session_summary.as_deref(), Some("You talked about work."));
    }

    #[tokio::test]
    async fn test_completed_without_end_time_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let session = db.sessions().create(&user.id).await.unwrap();

        let result = sqlx::query("UPDATE sessions SET status = 'completed' WHERE id = ?")
            .bind(&session.id)
            .execute(db.pool())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let sessions = db.sessions();

        let first = sessions.create(&user.id).await.unwrap();
        let second = sessions.create(&user.id).await.unwrap();

        let listed = sessions.list_for_user(&user.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn test_record_planner_entries() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let sessions = db.sessions();
        let session = sessions.create(&user.id).await.unwrap();

        let ids = vec!["e1".to_string(), "e2".to_string()];
        sessions.record_planner_entries(&session.id, &ids).await.unwrap();

        let stored = sessions.get(&session.id).await.unwrap().unwrap();
        assert_eq!(stored.generated_planner_entry_ids, Some(ids));
    }

    #[tokio::test]
    async fn test_mark_finalized_requires_completion() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let sessions = db.sessions();
        let session = sessions.create(&user.id).await.unwrap();

        sessions.mark_finalized(&session.id).await.unwrap();
        assert!(sessions.get(&session.id).await.unwrap().unwrap().finalized_at.is_none());

        sessions.complete_with_summary(&session.id, "Done.").await.unwrap();
        sessions.mark_finalized(&session.id).await.unwrap();
        assert!(sessions.get(&session.id).await.unwrap().unwrap().finalized_at.is_some());
    }
}
