//! Session Orchestrator
//!
//! Drives one conversational turn:
//! 1. resolve the user's words (transcribe a stored recording, or take typed text)
//! 2. append the user turn
//! 3. read the recent history window and assemble the prompt
//! 4. call the LLM, substituting the fallback reply for empty content
//! 5. append the assistant turn
//! 6. synthesize the reply
//!
//! The two appends are sequential, not a transaction: a failure after step 2
//! leaves a user turn without a reply, which the next turn simply follows.

use anyhow::{Context, Result};
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::prompt;
use crate::config::SessionConfig;
use crate::db::{Database, Role, Session, User};
use crate::llm::{LLMProvider, Message, ResponseFormat};
use crate::speech::SpeechProvider;

/// One unit of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnInput {
    /// A recording previously uploaded to blob storage
    Audio { storage_id: String },
    /// Typed text
    Text { text: String },
}

/// Result of a completed turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutput {
    /// Synthesized assistant reply
    pub audio: Vec<u8>,
    /// What the speech provider heard; only set for audio input
    pub user_transcript: Option<String>,
    pub assistant_text: String,
}

/// Session Orchestrator
pub struct SessionOrchestrator {
    db: Arc<Database>,
    llm: Arc<dyn LLMProvider>,
    speech: Arc<dyn SpeechProvider>,
    config: SessionConfig,
}

impl SessionOrchestrator {
    pub fn new(
        db: Arc<Database>,
        llm: Arc<dyn LLMProvider>,
        speech: Arc<dyn SpeechProvider>,
        config: SessionConfig,
    ) -> Self {
        Self {
            db,
            llm,
            speech,
            config,
        }
    }

    /// Run one turn for `session_id` on behalf of `caller_id`
    pub async fn run_turn(
        &self,
        caller_id: &str,
        session_id: &str,
        input: TurnInput,
    ) -> Result<TurnOutput> {
        let (session, user) = self.owned_session(caller_id, session_id).await?;

        let (user_text, from_audio) = self.resolve_input(&user.id, input).await?;

        let transcripts = self.db.transcripts();
        transcripts
            .append(&session.id, &session.user_id, Role::User, &user_text, None)
            .await
            .context("Failed to persist user turn")?;

        let messages = self.build_messages(&user, &session.id).await?;
        debug!("Session {} prompt has {} messages", session.id, messages.len());

        let completion = self
            .llm
            .complete(&messages, ResponseFormat::Text)
            .await
            .map_err(EngineError::from)?;

        let assistant_text = match completion {
            Some(content) if !content.trim().is_empty() => content,
            _ => {
                warn!("Empty completion for session {}, using fallback reply", session.id);
                self.config.fallback_reply.clone()
            }
        };

        transcripts
            .append(&session.id, &session.user_id, Role::Assistant, &assistant_text, None)
            .await
            .context("Failed to persist assistant turn")?;

        let audio = self
            .speech
            .synthesize(&assistant_text, voice_for(&user))
            .await?;

        info!(
            session_id = %session.id,
            from_audio,
            audio_bytes = audio.len(),
            "Turn completed"
        );

        Ok(TurnOutput {
            audio,
            user_transcript: from_audio.then_some(user_text),
            assistant_text,
        })
    }

    /// Speak the opening greeting, recording it only if the transcript is empty
    pub async fn start_conversation(&self, caller_id: &str, session_id: &str) -> Result<Vec<u8>> {
        let (session, user) = self.owned_session(caller_id, session_id).await?;
        let transcripts = self.db.transcripts();

        if transcripts.count(&session.id).await? == 0 {
            transcripts
                .append(
                    &session.id,
                    &session.user_id,
                    Role::Assistant,
                    &self.config.greeting,
                    None,
                )
                .await
                .context("Failed to persist greeting")?;
            info!("Session {} started with greeting", session.id);
        }

        let audio = self
            .speech
            .synthesize(&self.config.greeting, voice_for(&user))
            .await?;
        Ok(audio)
    }

    /// Load the session and its owner, requiring the caller to be that owner
    async fn owned_session(&self, caller_id: &str, session_id: &str) -> Result<(Session, User)> {
        let session = self
            .db
            .sessions()
            .get(session_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("Session".to_string()))?;

        if session.user_id != caller_id {
            warn!("Caller {} attempted a turn in session {}", caller_id, session_id);
            return Err(EngineError::Forbidden("session belongs to another user".to_string()).into());
        }

        let user = self
            .db
            .users()
            .get(&session.user_id)
            .await?
            .ok_or_else(|| EngineError::NotFound("User".to_string()))?;

        Ok((session, user))
    }

    /// The user's words for this turn, and whether they came from audio
    async fn resolve_input(&self, caller_id: &str, input: TurnInput) -> Result<(String, bool)> {
        match input {
            TurnInput::Text { text } => {
                if text.trim().is_empty() {
                    return Err(EngineError::InvalidInput("Message text is empty".to_string()).into());
                }
                Ok((text, false))
            }
            TurnInput::Audio { storage_id } => {
                let blob = self
                    .db
                    .blobs()
                    .get(&storage_id)
                    .await?
                    .ok_or_else(|| EngineError::NotFound("Audio".to_string()))?;

                if blob.owner_id.as_deref() != Some(caller_id) {
                    warn!("Caller {} used audio {} they did not upload", caller_id, storage_id);
                    return Err(EngineError::Forbidden(
                        "recording belongs to another user".to_string(),
                    )
                    .into());
                }
                if blob.bytes.is_empty() {
                    return Err(EngineError::UnsupportedAudio("recording is empty".to_string()).into());
                }
                if !self.is_supported_audio(&blob.content_type) {
                    return Err(EngineError::UnsupportedAudio(format!(
                        "content type '{}' is not accepted",
                        blob.content_type
                    ))
                    .into());
                }

                let transcript = self
                    .speech
                    .transcribe(&blob.bytes, &blob.content_type)
                    .await?;
                if transcript.trim().is_empty() {
                    return Err(EngineError::Transcription("No speech detected".to_string()).into());
                }

                Ok((transcript, true))
            }
        }
    }

    fn is_supported_audio(&self, content_type: &str) -> bool {
        // Browsers append codec parameters, e.g. "audio/webm;codecs=opus"
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        self.config
            .supported_audio_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(&essence))
    }

    async fn build_messages(&self, user: &User, session_id: &str) -> Result<Vec<Message>> {
        let mut history = self
            .db
            .transcripts()
            .recent(session_id, self.config.history_window)
            .await?;
        history.reverse();

        let active = self.db.planner().active_for_user(&user.id).await?;
        let methodology = self.db.knowledge().core_methodology_text().await?;
        if methodology.is_none() {
            debug!("No core methodology stored, using persona only");
        }

        let system = prompt::system_prompt(
            methodology.as_deref(),
            &prompt::render_onboarding(user),
            &prompt::render_planner(&active),
        );

        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.push(Message::system(system));
        messages.extend(prompt::history_messages(&history));
        Ok(messages)
    }
}

fn voice_for(user: &User) -> Option<&str> {
    user.preferences
        .as_ref()
        .and_then(|p| p.tts_voice.as_deref())
        .filter(|v| !v.trim().is_empty())
}
