//! Application facade
//!
//! Every caller-facing operation goes through [`App`], which resolves the
//! caller's identity to a user record and enforces ownership:
//!
//! - reads answer [`Scoped::Unauthorized`] for an unknown or non-owning caller
//! - writes fail with `EngineError::Unauthorized` (unknown caller) or
//!   `EngineError::Forbidden` (record owned by someone else)

pub mod mind_map;

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use sdk::types::{OnboardingResponse, Preferences};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::auth::{Identity, Scoped};
use crate::config::Config;
use crate::conversation::{
    FinalizeReport, FinalizeStep, SessionFinalizer, SessionOrchestrator, TurnInput, TurnOutput,
};
use crate::db::{
    now_millis, Database, KnowledgeDoc, PlannerEntry, PlannerStatus, Session, TranscriptChunk,
    User,
};
use crate::llm::openai::OpenAICompatProvider;
use crate::llm::LLMProvider;
use crate::secrets::SecretCache;
use crate::speech::{DeepgramProvider, SpeechProvider};

pub use mind_map::MindMap;

/// Readiness of the service and its providers
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub version: &'static str,
    pub llm_provider: String,
    pub llm_ready: bool,
    pub speech_provider: String,
    pub speech_ready: bool,
    pub core_methodology: bool,
}

/// Application facade
pub struct App {
    config: Config,
    db: Arc<Database>,
    llm: Arc<dyn LLMProvider>,
    speech: Arc<dyn SpeechProvider>,
    orchestrator: SessionOrchestrator,
    finalizer: SessionFinalizer,
}

impl App {
    /// Open the database and build the production providers
    pub async fn open(config: Config, secrets: Arc<SecretCache>) -> Result<Self> {
        let db = Arc::new(Database::new(&config.db_path()).await?);

        let llm: Arc<dyn LLMProvider> = Arc::new(
            OpenAICompatProvider::new(config.llm.clone(), secrets.clone())
                .map_err(EngineError::from)?,
        );
        let speech: Arc<dyn SpeechProvider> =
            Arc::new(DeepgramProvider::new(config.speech.clone(), secrets)?);

        Ok(Self::with_providers(config, db, llm, speech))
    }

    /// Assemble the facade from already-built parts
    pub fn with_providers(
        config: Config,
        db: Arc<Database>,
        llm: Arc<dyn LLMProvider>,
        speech: Arc<dyn SpeechProvider>,
    ) -> Self {
        let orchestrator = SessionOrchestrator::new(
            db.clone(),
            llm.clone(),
            speech.clone(),
            config.session.clone(),
        );
        let finalizer =
            SessionFinalizer::new(db.clone(), llm.clone(), config.session.history_window);

        Self {
            config,
            db,
            llm,
            speech,
            orchestrator,
            finalizer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub async fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            version: env!("CARGO_PKG_VERSION"),
            llm_provider: self.llm.name().to_string(),
            llm_ready: self.llm.check_health().await,
            speech_provider: self.speech.name().to_string(),
            speech_ready: self.speech.check_health().await,
            core_methodology: self.db.knowledge().core_methodology().await?.is_some(),
        })
    }

    /// Flush and close the database
    pub async fn shutdown(self) -> Result<()> {
        drop(self.orchestrator);
        drop(self.finalizer);
        match Arc::try_unwrap(self.db) {
            Ok(db) => db.close().await,
            Err(db) => db.flush_wal().await,
        }
    }

    async fn caller(&self, identity: &Identity) -> Result<Option<User>> {
        self.db.users().find_by_subject(&identity.subject).await
    }

    async fn require_caller(&self, identity: &Identity) -> Result<User> {
        self.caller(identity)
            .await?
            .ok_or_else(|| EngineError::Unauthorized.into())
    }

    // ---- users -------------------------------------------------------------

    /// Create the caller's user record on first sight; refresh a changed email
    pub async fn ensure_user(&self, identity: &Identity) -> Result<User> {
        if identity.subject.trim().is_empty() {
            return Err(EngineError::Unauthorized.into());
        }
        self.db
            .users()
            .ensure(&identity.subject, &identity.email, identity.name.as_deref())
            .await
    }

    pub async fn my_profile(&self, identity: &Identity) -> Result<Scoped<User>> {
        Ok(match self.caller(identity).await? {
            Some(user) => Scoped::Authorized(user),
            None => Scoped::Unauthorized,
        })
    }

    pub async fn save_onboarding(
        &self,
        identity: &Identity,
        responses: Vec<OnboardingResponse>,
    ) -> Result<User> {
        let user = self.require_caller(identity).await?;
        if responses.is_empty() {
            return Err(EngineError::InvalidInput("No onboarding answers given".to_string()).into());
        }

        self.db.users().save_onboarding(&user.id, &responses).await?;
        info!("User {} completed onboarding ({} answers)", user.id, responses.len());

        self.reload_user(&user.id).await
    }

    pub async fn update_preferences(
        &self,
        identity: &Identity,
        goals: Option<Vec<String>>,
        tts_voice: Option<String>,
    ) -> Result<User> {
        let user = self.require_caller(identity).await?;

        let preferences = tts_voice.map(|voice| Preferences {
            tts_voice: Some(voice).filter(|v| !v.trim().is_empty()),
        });
        self.db
            .users()
            .update_preferences(&user.id, goals.as_ref(), preferences.as_ref())
            .await?;

        self.reload_user(&user.id).await
    }

    pub async fn mind_map(&self, identity: &Identity) -> Result<Scoped<MindMap>> {
        Ok(self
            .my_profile(identity)
            .await?
            .map(|user| mind_map::build(&user)))
    }

    async fn reload_user(&self, user_id: &str) -> Result<User> {
        self.db
            .users()
            .get(user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("User".to_string()).into())
    }

    // ---- sessions ----------------------------------------------------------

    pub async fn create_session(&self, identity: &Identity) -> Result<Session> {
        let user = self.require_caller(identity).await?;
        let session = self.db.sessions().create(&user.id).await?;
        info!("User {} opened session {}", user.id, session.id);
        Ok(session)
    }

    /// A session, if the caller owns it. Unknown ids are `NotFound`.
    pub async fn get_session(&self, identity: &Identity, session_id: &str) -> Result<Scoped<Session>> {
        let session = self
            .db
            .sessions()
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Session".to_string()))?;

        Ok(match self.caller(identity).await? {
            Some(user) if user.id == session.user_id => Scoped::Authorized(session),
            _ => Scoped::Unauthorized,
        })
    }

    /// The caller's sessions, newest first
    pub async fn list_my_sessions(&self, identity: &Identity) -> Result<Scoped<Vec<Session>>> {
        match self.caller(identity).await? {
            Some(user) => Ok(Scoped::Authorized(
                self.db.sessions().list_for_user(&user.id).await?,
            )),
            None => Ok(Scoped::Unauthorized),
        }
    }

    /// The session's transcript, oldest first
    pub async fn transcript(
        &self,
        identity: &Identity,
        session_id: &str,
    ) -> Result<Scoped<Vec<TranscriptChunk>>> {
        let session = match self.get_session(identity, session_id).await? {
            Scoped::Authorized(session) => session,
            Scoped::Unauthorized => {
                tracing::warn!("Unauthorized transcript read for session {}", session_id);
                return Ok(Scoped::Unauthorized);
            }
        };

        Ok(Scoped::Authorized(
            self.db.transcripts().list(&session.id).await?,
        ))
    }

    pub async fn start_conversation(&self, identity: &Identity, session_id: &str) -> Result<Vec<u8>> {
        let user = self.require_caller(identity).await?;
        self.orchestrator.start_conversation(&user.id, session_id).await
    }

    pub async fn take_turn(
        &self,
        identity: &Identity,
        session_id: &str,
        input: TurnInput,
    ) -> Result<TurnOutput> {
        let user = self.require_caller(identity).await?;
        self.orchestrator.run_turn(&user.id, session_id, input).await
    }

    pub async fn end_session(&self, identity: &Identity, session_id: &str) -> Result<FinalizeReport> {
        let user = self.require_caller(identity).await?;
        self.finalizer.finalize(&user.id, session_id).await
    }

    pub async fn resume_end_session(
        &self,
        identity: &Identity,
        session_id: &str,
        from: FinalizeStep,
    ) -> Result<FinalizeReport> {
        let user = self.require_caller(identity).await?;
        self.finalizer.resume(&user.id, session_id, from).await
    }

    // ---- planner -----------------------------------------------------------

    /// The caller's planner entries, newest first
    pub async fn planner_entries(&self, identity: &Identity) -> Result<Scoped<Vec<PlannerEntry>>> {
        match self.caller(identity).await? {
            Some(user) => Ok(Scoped::Authorized(
                self.db.planner().list_for_user(&user.id).await?,
            )),
            None => Ok(Scoped::Unauthorized),
        }
    }

    async fn owned_entry(&self, identity: &Identity, entry_id: &str) -> Result<PlannerEntry> {
        let user = self.require_caller(identity).await?;
        let entry = self
            .db
            .planner()
            .get(entry_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Planner entry".to_string()))?;

        if entry.user_id != user.id {
            return Err(EngineError::Forbidden("planner entry belongs to another user".to_string()).into());
        }
        Ok(entry)
    }

    pub async fn update_planner_status(
        &self,
        identity: &Identity,
        entry_id: &str,
        status: PlannerStatus,
    ) -> Result<PlannerEntry> {
        let entry = self.owned_entry(identity, entry_id).await?;
        self.db.planner().update_status(&entry.id, status).await
    }

    pub async fn annotate_planner_entry(
        &self,
        identity: &Identity,
        entry_id: &str,
        notes: Option<String>,
        due_date: Option<i64>,
    ) -> Result<PlannerEntry> {
        let entry = self.owned_entry(identity, entry_id).await?;
        let planner = self.db.planner();

        planner
            .annotate(&entry.id, notes.as_deref(), due_date)
            .await?;
        planner
            .get(&entry.id)
            .await?
            .context("Planner entry vanished after update")
    }

    // ---- storage & knowledge -----------------------------------------------

    /// Reserve a single-use upload slot and return the relative URL to PUT to
    pub async fn generate_upload_url(&self, identity: &Identity) -> Result<String> {
        let user = self.require_caller(identity).await?;
        let blobs = self.db.blobs();

        if let Err(e) = blobs.prune(now_millis()).await {
            warn!("Storage pruning failed: {:#}", e);
        }

        let token = blobs.reserve_upload(&user.id).await?;
        Ok(format!("/api/storage/upload/{}", token))
    }

    /// Store uploaded bytes against a reserved slot, returning the storage id
    pub async fn upload(&self, token: &str, content_type: &str, bytes: &[u8]) -> Result<String> {
        if bytes.is_empty() {
            return Err(EngineError::InvalidInput("Upload is empty".to_string()).into());
        }
        self.db.blobs().upload(token, content_type, bytes).await
    }

    /// Register a stored file as the core methodology, replacing any previous one.
    ///
    /// Restricted to the subjects in `auth.methodology_admins`.
    pub async fn set_core_methodology(
        &self,
        identity: &Identity,
        storage_id: &str,
        description: &str,
    ) -> Result<KnowledgeDoc> {
        let user = self.require_caller(identity).await?;
        if !self.config.auth.is_methodology_admin(&identity.subject) {
            warn!("User {} tried to replace the core methodology", user.id);
            return Err(EngineError::Forbidden(
                "only methodology admins may replace the core methodology".to_string(),
            )
            .into());
        }

        let doc = self
            .db
            .knowledge()
            .set_core_methodology(storage_id, description)
            .await?;
        info!("User {} replaced the core methodology", user.id);
        Ok(doc)
    }

    /// Store text as the core methodology in one step (operator path, no caller)
    pub async fn set_core_methodology_text(
        &self,
        text: &str,
        description: &str,
    ) -> Result<KnowledgeDoc> {
        if text.trim().is_empty() {
            return Err(EngineError::InvalidInput("Methodology document is empty".to_string()).into());
        }
        let storage_id = self.db.blobs().put("text/plain", text.as_bytes()).await?;
        self.db
            .knowledge()
            .set_core_methodology(&storage_id, description)
            .await
    }

    pub async fn core_methodology_text(&self) -> Result<Option<String>> {
        self.db.knowledge().core_methodology_text().await
    }
}
