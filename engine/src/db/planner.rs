/// Planner persistence operations
///
/// Entries are created by the finalizer in `pending` state and afterwards move
/// only through [`PlannerStatus::can_transition_to`].
use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sdk::types::TaskDraft;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::now_millis;

/// Planner entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStatus {
    Pending,
    InProgress,
    Completed,
    Skipped,
}

impl PlannerStatus {
    pub const ALL: [PlannerStatus; 4] = [
        PlannerStatus::Pending,
        PlannerStatus::InProgress,
        PlannerStatus::Completed,
        PlannerStatus::Skipped,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlannerStatus::Pending => "pending",
            PlannerStatus::InProgress => "in_progress",
            PlannerStatus::Completed => "completed",
            PlannerStatus::Skipped => "skipped",
        }
    }

    pub fn parse(s: &str) -> Result<Self, EngineError> {
        match s {
            "pending" => Ok(PlannerStatus::Pending),
            "in_progress" => Ok(PlannerStatus::InProgress),
            "completed" => Ok(PlannerStatus::Completed),
            "skipped" => Ok(PlannerStatus::Skipped),
            other => Err(EngineError::InvalidInput(format!(
                "unknown planner status '{}'",
                other
            ))),
        }
    }

    /// `completed` and `skipped` are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, PlannerStatus::Completed | PlannerStatus::Skipped)
    }

    pub fn can_transition_to(&self, next: PlannerStatus) -> bool {
        use PlannerStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress) | (Pending, Skipped) | (InProgress, Completed) | (InProgress, Skipped)
        )
    }
}

/// Planner entry record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerEntry {
    pub id: String,
    pub user_id: String,
    pub session_id: Option<String>,
    pub created_at: i64,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub title: String,
    pub description: String,
    pub status: PlannerStatus,
    pub due_date: Option<i64>,
    pub notes: Option<String>,
}

const ENTRY_COLUMNS: &str =
    "id, user_id, session_id, created_at, entry_type, title, description, status, due_date, notes";

fn entry_from_row(r: &SqliteRow) -> Result<PlannerEntry> {
    let status: String = r.get("status");
    Ok(PlannerEntry {
        id: r.get("id"),
        user_id: r.get("user_id"),
        session_id: r.get("session_id"),
        created_at: r.get("created_at"),
        entry_type: r.get("entry_type"),
        title: r.get("title"),
        description: r.get("description"),
        status: PlannerStatus::parse(&status)?,
        due_date: r.get("due_date"),
        notes: r.get("notes"),
    })
}

/// Planner repository for database operations
#[derive(Clone)]
pub struct PlannerRepository {
    pool: SqlitePool,
}

impl PlannerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Insert a pending entry tied to a user and the session that produced it
    pub async fn create_pending(
        &self,
        user_id: &str,
        session_id: Option<&str>,
        draft: &TaskDraft,
    ) -> Result<PlannerEntry> {
        let entry = PlannerEntry {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            session_id: session_id.map(str::to_string),
            created_at: now_millis(),
            entry_type: draft.entry_type.clone(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            status: PlannerStatus::Pending,
            due_date: None,
            notes: None,
        };

        sqlx::query(
            "INSERT INTO planner_entries (id, user_id, session_id, created_at, entry_type, title, description, status) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.user_id)
        .bind(&entry.session_id)
        .bind(entry.created_at)
        .bind(&entry.entry_type)
        .bind(&entry.title)
        .bind(&entry.description)
        .bind(entry.status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to create planner entry")?;

        Ok(entry)
    }

    pub async fn get(&self, entry_id: &str) -> Result<Option<PlannerEntry>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM planner_entries WHERE id = ?",
            ENTRY_COLUMNS
        ))
        .bind(entry_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch planner entry")?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// All entries of a user, newest first
    pub async fn list_for_user(&self, user_id: &str) -> Result<Vec<PlannerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM planner_entries WHERE user_id = ? ORDER BY created_at DESC, rowid DESC",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list planner entries")?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Ids of the entries generated from a session, in creation order
    pub async fn ids_for_session(&self, session_id: &str) -> Result<Vec<String>> {
        sqlx::query_scalar(
            "SELECT id FROM planner_entries WHERE session_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list session planner entries")
    }

    /// Entries the user is still working on (`pending` or `in_progress`), oldest first
    pub async fn active_for_user(&self, user_id: &str) -> Result<Vec<PlannerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM planner_entries WHERE user_id = ? AND status IN ('pending', 'in_progress') \
             ORDER BY created_at ASC, rowid ASC",
            ENTRY_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list active planner entries")?;

        rows.iter().map(entry_from_row).collect()
    }

    /// Move an entry to `next`, rejecting transitions the state machine forbids.
    ///
    /// The UPDATE is conditioned on the status that was checked, so a
    /// concurrent change surfaces as `InvalidTransition` instead of being lost.
    pub async fn update_status(&self, entry_id: &str, next: PlannerStatus) -> Result<PlannerEntry> {
        let entry = self
            .get(entry_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Planner entry".to_string()))?;

        if !entry.status.can_transition_to(next) {
            return Err(EngineError::InvalidTransition {
                from: entry.status.as_str().to_string(),
                to: next.as_str().to_string(),
            }
            .into());
        }

        let result = sqlx::query("UPDATE planner_entries SET status = ? WHERE id = ? AND status = ?")
            .bind(next.as_str())
            .bind(entry_id)
            .bind(entry.status.as_str())
            .execute(&self.pool)
            .await
            .context("Failed to update planner status")?;

        if result.rows_affected() == 0 {
            let current = self
                .get(entry_id)
                .await?
                .map(|e| e.status.as_str().to_string())
                .unwrap_or_else(|| "missing".to_string());
            return Err(EngineError::InvalidTransition {
                from: current,
                to: next.as_str().to_string(),
            }
            .into());
        }

        tracing::info!(entry_id, from = entry.status.as_str(), to = next.as_str(), "Planner entry moved");

        Ok(PlannerEntry {
            status: next,
            ..entry
        })
    }

    /// Set notes and/or due date; `None` leaves a field unchanged
    pub async fn annotate(
        &self,
        entry_id: &str,
        notes: Option<&str>,
        due_date: Option<i64>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE planner_entries SET notes = COALESCE(?, notes), due_date = COALESCE(?, due_date) \
             WHERE id = ?",
        )
        .bind(notes)
        .bind(due_date)
        .bind(entry_id)
        .execute(&self.pool)
        .await
        .context("Failed to annotate planner entry")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use tempfile::TempDir;

    fn draft(title: &str) -> TaskDraft {
        TaskDraft {
            entry_type: "small_action".to_string(),
            title: title.to_string(),
            description: "Do it".to_string(),
        }
    }

    #[test]
    fn test_transition_table() {
        use PlannerStatus::*;
        assert!(Pending.can_transition_to(InProgress));
        assert!(Pending.can_transition_to(Skipped));
        assert!(InProgress.can_transition_to(Completed));
        assert!(InProgress.can_transition_to(Skipped));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Pending));
        assert!(!InProgress.can_transition_to(Pending));
        for next in PlannerStatus::ALL {
            assert!(!Completed.can_transition_to(next));
            assert!(!Skipped.can_transition_to(next));
        }
    }

    #[test]
    fn test_parse_round_trip() {
        for status in PlannerStatus::ALL {
            assert_eq!(PlannerStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(PlannerStatus::parse("done").is_err());
    }

    #[tokio::test]
    async fn test_status_flow() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let planner = db.planner();

        let entry = planner.create_pending(&user.id, None, &draft("Walk")).await.unwrap();
        assert_eq!(entry.status, PlannerStatus::Pending);

        let entry = planner
            .update_status(&entry.id, PlannerStatus::InProgress)
            .await
            .unwrap();
        assert_eq!(entry.status, PlannerStatus::InProgress);

        planner
            .update_status(&entry.id, PlannerStatus::Completed)
            .await
            .unwrap();

        let err = planner
            .update_status(&entry.id, PlannerStatus::Pending)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidTransition { .. })
        ));

        let stored = planner.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.status, PlannerStatus::Completed);
    }

    #[tokio::test]
    async fn test_active_excludes_terminal() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let planner = db.planner();

        let keep = planner.create_pending(&user.id, None, &draft("Keep")).await.unwrap();
        let skip = planner.create_pending(&user.id, None, &draft("Skip")).await.unwrap();
        planner
            .update_status(&skip.id, PlannerStatus::Skipped)
            .await
            .unwrap();

        let active = planner.active_for_user(&user.id).await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, keep.id);
        assert_eq!(planner.list_for_user(&user.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_annotate() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let planner = db.planner();
        let entry = planner.create_pending(&user.id, None, &draft("Note")).await.unwrap();

        planner.annotate(&entry.id, Some("felt good"), None).await.unwrap();
        planner.annotate(&entry.id, None, Some(1_700_000_000_000)).await.unwrap();

        let stored = planner.get(&entry.id).await.unwrap().unwrap();
        assert_eq!(stored.notes.as_deref(), Some("felt good"));
        assert_eq!(stored.due_date, Some(1_700_000_000_000));
    }

    #[tokio::test]
    async fn test_ids_for_session() {
        let temp_dir = TempDir::new().unwrap();
        let db = Database::new(&temp_dir.path().join("test.db")).await.unwrap();
        let user = db.users().ensure("sub", "a@example.com", None).await.unwrap();
        let session = db.sessions().create(&user.id).await.unwrap();
        let planner = db.planner();

        let first = planner
            .create_pending(&user.id, Some(&session.id), &draft("Walk"))
            .await
            .unwrap();
        planner.create_pending(&user.id, None, &draft("Loose")).await.unwrap();
        let second = planner
            .create_pending(&user.id, Some(&session.id), &draft("Write"))
            .await
            .unwrap();

        let ids = planner.ids_for_session(&session.id).await.unwrap();
        assert_eq!(ids, vec![first.id, second.id]);
        assert!(planner.ids_for_session("other").await.unwrap().is_empty());
    }
}
