//! End-of-Session Finalizer
//!
//! Closes a session in three steps, driven as a small state machine:
//!
//! ```text
//! Summarizing ──> GeneratingTasks ──> UpdatingProfile ──> Done
//!      │                 │                   │
//!      └─────────────────┴───────────────────┴──> PartiallyFailed { at, reason }
//! ```
//!
//! Writes are committed step by step and never rolled back, so a failure in
//! a later step leaves the earlier results in place. [`SessionFinalizer::resume`]
//! re-enters the machine at a later step to retry. Task generation runs at
//! most once per session: entries already linked to the session are reused.
//! A session that reached `Done` is marked finalized and cannot be resumed.

use anyhow::Result;
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{error, info, warn};

use super::{planner_gen, profile, prompt};
use crate::db::{Database, Session, SessionStatus, TranscriptChunk, User};
use crate::llm::{LLMProvider, Message, ResponseFormat, Validated};

pub const SUMMARY_FALLBACK: &str = "Could not generate a summary.";

/// A step of the pipeline, used to report and resume failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalizeStep {
    Summarize,
    GenerateTasks,
    UpdateProfile,
}

/// Why a step stopped the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    /// The session has no transcript turns
    NoTranscript,
    /// The LLM call itself failed
    Provider(String),
    /// The LLM answered with something that failed validation
    InvalidResponse(String),
    /// Persisting the step's result failed
    Storage(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NoTranscript => write!(f, "no transcript"),
            FailureReason::Provider(e) => write!(f, "provider error: {}", e),
            FailureReason::InvalidResponse(e) => write!(f, "invalid response: {}", e),
            FailureReason::Storage(e) => write!(f, "storage error: {}", e),
        }
    }
}

/// Finalizer state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum FinalizeStage {
    Summarizing,
    GeneratingTasks,
    UpdatingProfile,
    Done,
    PartiallyFailed {
        at: FinalizeStep,
        reason: FailureReason,
    },
}

impl FinalizeStage {
    fn entry(step: FinalizeStep) -> Self {
        match step {
            FinalizeStep::Summarize => FinalizeStage::Summarizing,
            FinalizeStep::GenerateTasks => FinalizeStage::GeneratingTasks,
            FinalizeStep::UpdateProfile => FinalizeStage::UpdatingProfile,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FinalizeStage::Done | FinalizeStage::PartiallyFailed { .. })
    }
}

/// Outcome of a finalizer run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalizeReport {
    pub session_id: String,
    /// Terminal stage: `Done` or `PartiallyFailed`
    pub outcome: FinalizeStage,
    pub summary: Option<String>,
    pub planner_entry_ids: Vec<String>,
    pub profile_updated: bool,
}

impl FinalizeReport {
    pub fn success(&self) -> bool {
        self.outcome == FinalizeStage::Done
    }
}

/// Working state carried between steps
struct Run {
    session: Session,
    user: User,
    transcript: Vec<TranscriptChunk>,
    summary: Option<String>,
    planner_entry_ids: Vec<String>,
    profile_updated: bool,
}

/// End-of-Session Finalizer
pub struct SessionFinalizer {
    db: Arc<Database>,
    llm: Arc<dyn LLMProvider>,
    history_window: i64,
}

impl SessionFinalizer {
    pub fn new(db: Arc<Database>, llm: Arc<dyn LLMProvider>, history_window: i64) -> Self {
        Self {
            db,
            llm,
            history_window,
        }
    }

    /// Run the whole pipeline for an active session
    pub async fn finalize(&self, caller_id: &str, session_id: &str) -> Result<FinalizeReport> {
        let run = self.load(caller_id, session_id).await?;
        if run.session.status == SessionStatus::Completed {
            return Err(EngineError::InvalidInput(
                "Session has already ended; resume a failed step instead".to_string(),
            )
            .into());
        }
        Ok(self.drive(run, FinalizeStep::Summarize).await)
    }

    /// Re-enter the pipeline at `from` for a session that stopped part way
    pub async fn resume(
        &self,
        caller_id: &str,
        session_id: &str,
        from: FinalizeStep,
    ) -> Result<FinalizeReport> {
        let run = self.load(caller_id, session_id).await?;
        if run.session.finalized_at.is_some() {
            return Err(EngineError::InvalidInput(
                "Session has already been finalized".to_string(),
            )
            .into());
        }

        match from {
            FinalizeStep::Summarize if run.session.status == SessionStatus::Completed => {
                return Err(EngineError::InvalidInput(
                    "Session is already summarized".to_string(),
                )
                .into());
            }
            FinalizeStep::GenerateTasks | FinalizeStep::UpdateProfile
                if run.session.status != SessionStatus::Completed =>
            {
                return Err(EngineError::InvalidInput(
                    "Session has not been summarized yet".to_string(),
                )
                .into());
            }
            _ => {}
        }

        Ok(self.drive(run, from).await)
    }

    async fn load(&self, caller_id: &str, session_id: &str) -> Result<Run> {
        let session = self
            .db
            .sessions()
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Session".to_string()))?;
        if session.user_id != caller_id {
            return Err(EngineError::Forbidden("session belongs to another user".to_string()).into());
        }

        let user = self
            .db
            .users()
            .get(&session.user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("User".to_string()))?;

        let mut transcript = self
            .db
            .transcripts()
            .recent(&session.id, self.history_window)
            .await?;
        transcript.reverse();

        Ok(Run {
            summary: session.session_summary.clone(),
            planner_entry_ids: session.generated_planner_entry_ids.clone().unwrap_or_default(),
            session,
            user,
            transcript,
            profile_updated: false,
        })
    }

    async fn drive(&self, mut run: Run, from: FinalizeStep) -> FinalizeReport {
        let mut stage = FinalizeStage::entry(from);

        while !stage.is_terminal() {
            info!("Session {} finalizer stage {:?}", run.session.id, stage);
            stage = match stage {
                FinalizeStage::Summarizing => match self.summarize(&mut run).await {
                    Ok(()) => FinalizeStage::GeneratingTasks,
                    Err(reason) => failed(&run, FinalizeStep::Summarize, reason),
                },
                FinalizeStage::GeneratingTasks => match self.generate_tasks(&mut run).await {
                    Ok(()) => FinalizeStage::UpdatingProfile,
                    Err(reason) => failed(&run, FinalizeStep::GenerateTasks, reason),
                },
                FinalizeStage::UpdatingProfile => match self.update_profile(&mut run).await {
                    Ok(()) => match self.db.sessions().mark_finalized(&run.session.id).await {
                        Ok(()) => FinalizeStage::Done,
                        Err(e) => failed(
                            &run,
                            FinalizeStep::UpdateProfile,
                            FailureReason::Storage(format!("{:#}", e)),
                        ),
                    },
                    Err(reason) => failed(&run, FinalizeStep::UpdateProfile, reason),
                },
                terminal => terminal,
            };
        }

        if stage == FinalizeStage::Done {
            info!(
                "Session {} finalized with {} planner entries",
                run.session.id,
                run.planner_entry_ids.len()
            );
        }

        FinalizeReport {
            session_id: run.session.id,
            outcome: stage,
            summary: run.summary,
            planner_entry_ids: run.planner_entry_ids,
            profile_updated: run.profile_updated,
        }
    }

    async fn summarize(&self, run: &mut Run) -> Result<(), FailureReason> {
        if run.transcript.is_empty() {
            return Err(FailureReason::NoTranscript);
        }

        let messages = [Message::system(prompt::summary_prompt(&run.transcript))];
        let completion = self
            .llm
            .complete(&messages, ResponseFormat::Text)
            .await
            .map_err(|e| FailureReason::Provider(e.to_string()))?;

        let summary = completion
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| SUMMARY_FALLBACK.to_string());

        self.db
            .sessions()
            .complete_with_summary(&run.session.id, &summary)
            .await
            .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;

        run.summary = Some(summary);
        Ok(())
    }

    async fn generate_tasks(&self, run: &mut Run) -> Result<(), FailureReason> {
        let planner = self.db.planner();
        let existing = planner
            .ids_for_session(&run.session.id)
            .await
            .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;
        if !existing.is_empty() {
            info!(
                "Session {} already has {} planner entries, keeping them",
                run.session.id,
                existing.len()
            );
            if run.session.generated_planner_entry_ids.as_ref() != Some(&existing) {
                self.db
                    .sessions()
                    .record_planner_entries(&run.session.id, &existing)
                    .await
                    .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;
            }
            run.planner_entry_ids = existing;
            return Ok(());
        }

        let summary = run.summary.as_deref().unwrap_or(SUMMARY_FALLBACK);
        let onboarding = prompt::render_onboarding(&run.user);

        let messages = [Message::system(planner_gen::planner_prompt(summary, &onboarding))];
        let completion = self
            .llm
            .complete(&messages, ResponseFormat::JsonObject)
            .await
            .map_err(|e| FailureReason::Provider(e.to_string()))?;

        let drafts = match completion.as_deref().map(planner_gen::parse_tasks) {
            Some(Validated::Parsed(drafts)) => drafts,
            Some(Validated::Invalid(reason)) => {
                warn!("Session {} planner reply rejected: {}", run.session.id, reason);
                Vec::new()
            }
            None => {
                warn!("Session {} planner reply was empty", run.session.id);
                Vec::new()
            }
        };

        let mut ids = Vec::with_capacity(drafts.len());
        for draft in &drafts {
            let entry = planner
                .create_pending(&run.user.id, Some(&run.session.id), draft)
                .await
                .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;
            ids.push(entry.id);
        }

        if !ids.is_empty() {
            self.db
                .sessions()
                .record_planner_entries(&run.session.id, &ids)
                .await
                .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;
        }

        run.planner_entry_ids = ids;
        Ok(())
    }

    async fn update_profile(&self, run: &mut Run) -> Result<(), FailureReason> {
        if run.transcript.is_empty() {
            return Err(FailureReason::NoTranscript);
        }

        let messages = [Message::system(profile::profile_prompt(&run.user, &run.transcript))];
        let completion = self
            .llm
            .complete(&messages, ResponseFormat::JsonObject)
            .await
            .map_err(|e| FailureReason::Provider(e.to_string()))?;

        let content = completion
            .ok_or_else(|| FailureReason::InvalidResponse("empty reply".to_string()))?;

        let update = match profile::parse_profile(&content) {
            Validated::Parsed(update) => update,
            Validated::Invalid(reason) => return Err(FailureReason::InvalidResponse(reason)),
        };

        self.db
            .users()
            .update_profile(&run.user.id, &update)
            .await
            .map_err(|e| FailureReason::Storage(format!("{:#}", e)))?;

        run.profile_updated = true;
        Ok(())
    }
}

fn failed(run: &Run, at: FinalizeStep, reason: FailureReason) -> FinalizeStage {
    match reason {
        FailureReason::NoTranscript => {
            warn!("Session {} finalizer stopped at {:?}: {}", run.session.id, at, reason)
        }
        _ => error!("Session {} finalizer failed at {:?}: {}", run.session.id, at, reason),
    }
    FinalizeStage::PartiallyFailed { at, reason }
}
