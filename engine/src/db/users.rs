/// User persistence operations
///
/// A user row is created on first authenticated access and afterwards only
/// patched: by onboarding, by post-session profile aggregation, and by
/// preference edits. Rows are never deleted.
use anyhow::{Context, Result};
use sdk::types::{KeyInsight, OnboardingResponse, Preferences, ProfileUpdate};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{decode_json, encode_json, now_millis};

/// User record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub auth_subject: String,
    pub email: String,
    pub name: Option<String>,
    pub onboarding_completed: bool,
    pub onboarding_responses: Option<Vec<OnboardingResponse>>,
    pub long_term_profile_summary: Option<String>,
    pub key_insights: Option<Vec<KeyInsight>>,
    pub current_goals: Option<Vec<String>>,
    pub preferences: Option<Preferences>,
    pub created_at: i64,
}

const USER_COLUMNS: &str = "id, auth_subject, email, name, onboarding_completed, \
     onboarding_responses, long_term_profile_summary, key_insights, current_goals, \
     preferences, created_at";

fn user_from_row(r: &SqliteRow) -> User {
    User {
        id: r.get("id"),
        auth_subject: r.get("auth_subject"),
        email: r.get("email"),
        name: r.get("name"),
        onboarding_completed: r.get::<i64, _>("onboarding_completed") != 0,
        onboarding_responses: decode_json(r.get("onboarding_responses")),
        long_term_profile_summary: r.get("long_term_profile_summary"),
        key_insights: decode_json(r.get("key_insights")),
        current_goals: decode_json(r.get("current_goals")),
        preferences: decode_json(r.get("preferences")),
        created_at: r.get("created_at"),
    }
}

/// User repository for database operations
#[derive(Clone)]
pub struct UserRepository {
    pool: SqlitePool,
}

impl UserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get a user by ID
    pub async fn get(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!("SELECT {} FROM users WHERE id = ?", USER_COLUMNS))
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch user")?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Get a user by the auth provider's subject
    pub async fn find_by_subject(&self, subject: &str) -> Result<Option<User>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users WHERE auth_subject = ?",
            USER_COLUMNS
        ))
        .bind(subject)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch user by subject")?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Create the user for `subject` if missing, otherwise refresh a changed email.
    ///
    /// The unique index on `auth_subject` makes concurrent calls converge on one row.
    pub async fn ensure(&self, subject: &str, email: &str, name: Option<&str>) -> Result<User> {
        sqlx::query(
            "INSERT INTO users (id, auth_subject, email, name, onboarding_completed, created_at) \
             VALUES (?, ?, ?, ?, 0, ?) ON CONFLICT(auth_subject) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(subject)
        .bind(email)
        .bind(name)
        .bind(now_millis())
        .execute(&self.pool)
        .await
        .context("Failed to insert user")?;

        sqlx::query("UPDATE users SET email = ? WHERE auth_subject = ? AND email <> ?")
            .bind(email)
            .bind(subject)
            .bind(email)
            .execute(&self.pool)
            .await
            .context("Failed to refresh user email")?;

        self.find_by_subject(subject)
            .await?
            .context("User missing right after ensure")
    }

    /// Store onboarding answers verbatim and mark onboarding complete.
    ///
    /// Never clears the completion flag.
    pub async fn save_onboarding(
        &self,
        user_id: &str,
        responses: &[OnboardingResponse],
    ) -> Result<()> {
        let encoded = encode_json(Some(&responses))?;

        sqlx::query(
            "UPDATE users SET onboarding_responses = ?, onboarding_completed = 1 WHERE id = ?",
        )
        .bind(encoded)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to save onboarding responses")?;

        Ok(())
    }

    /// Replace the cumulative profile summary and insights
    pub async fn update_profile(&self, user_id: &str, update: &ProfileUpdate) -> Result<()> {
        sqlx::query(
            "UPDATE users SET long_term_profile_summary = ?, key_insights = ? WHERE id = ?",
        )
        .bind(&update.long_term_profile_summary)
        .bind(encode_json(Some(&update.key_insights))?)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to update user profile")?;

        Ok(())
    }

    /// Update goals and/or preferences; `None` leaves a field unchanged
    pub async fn update_preferences(
        &self,
        user_id: &str,
        goals: Option<&Vec<String>>,
        preferences: Option<&Preferences>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET current_goals = COALESCE(?, current_goals), \
             preferences = COALESCE(?, preferences) WHERE id = ?",
        )
        .bind(encode_json(goals)?)
        .bind(encode_json(preferences)?)
        .bind(user_id)
        .execute(&self.pool)
        .await
        .context("Failed to update preferences")?;

        Ok(())
    }
}
