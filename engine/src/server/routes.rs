//! HTTP handlers
//!
//! Each handler resolves the caller, calls into [`crate::app::App`] and
//! shapes the result. Audio travels base64-encoded.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap};
use axum::Json;
use base64::{engine::general_purpose, Engine as _};
use sdk::errors::EngineError;
use sdk::types::OnboardingResponse;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::error::ApiError;
use super::identity::Caller;
use super::ServerState;
use crate::app::MindMap;
use crate::auth::Scoped;
use crate::conversation::{FinalizeReport, FinalizeStep, TurnInput};
use crate::db::{KnowledgeDoc, PlannerEntry, PlannerStatus, Session, TranscriptChunk, User};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Single-record reads answer 403 when the caller may not see the record
fn owned<T>(scoped: Scoped<T>) -> Result<T, ApiError> {
    match scoped {
        Scoped::Authorized(value) => Ok(value),
        Scoped::Unauthorized => {
            Err(EngineError::Forbidden("not visible to this caller".to_string()).into())
        }
    }
}

/// Listings answer an empty list instead
fn listed<T>(scoped: Scoped<Vec<T>>) -> Vec<T> {
    scoped.authorized().unwrap_or_default()
}

fn encode_audio(audio: &[u8]) -> String {
    general_purpose::STANDARD.encode(audio)
}

pub async fn status_handler(State(state): State<ServerState>) -> ApiResult<Value> {
    let report = state.app.status().await?;
    Ok(Json(json!({
        "status": "running",
        "version": report.version,
        "llm": { "provider": report.llm_provider, "ready": report.llm_ready },
        "speech": { "provider": report.speech_provider, "ready": report.speech_ready },
        "coreMethodology": report.core_methodology,
    })))
}

// ---- users -----------------------------------------------------------------

pub async fn ensure_user(State(state): State<ServerState>, Caller(identity): Caller) -> ApiResult<User> {
    Ok(Json(state.app.ensure_user(&identity).await?))
}

pub async fn my_profile(State(state): State<ServerState>, Caller(identity): Caller) -> ApiResult<User> {
    Ok(Json(owned(state.app.my_profile(&identity).await?)?))
}

#[derive(Debug, Deserialize)]
pub struct OnboardingBody {
    pub responses: Vec<OnboardingResponse>,
}

pub async fn save_onboarding(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Json(body): Json<OnboardingBody>,
) -> ApiResult<User> {
    Ok(Json(
        state.app.save_onboarding(&identity, body.responses).await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesBody {
    pub current_goals: Option<Vec<String>>,
    pub tts_voice: Option<String>,
}

pub async fn update_preferences(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Json(body): Json<PreferencesBody>,
) -> ApiResult<User> {
    Ok(Json(
        state
            .app
            .update_preferences(&identity, body.current_goals, body.tts_voice)
            .await?,
    ))
}

pub async fn mind_map(State(state): State<ServerState>, Caller(identity): Caller) -> ApiResult<MindMap> {
    Ok(Json(owned(state.app.mind_map(&identity).await?)?))
}

// ---- sessions --------------------------------------------------------------

pub async fn create_session(
    State(state): State<ServerState>,
    Caller(identity): Caller,
) -> ApiResult<Session> {
    Ok(Json(state.app.create_session(&identity).await?))
}

pub async fn list_sessions(
    State(state): State<ServerState>,
    Caller(identity): Caller,
) -> ApiResult<Vec<Session>> {
    Ok(Json(listed(state.app.list_my_sessions(&identity).await?)))
}

pub async fn get_session(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
) -> ApiResult<Session> {
    Ok(Json(owned(
        state.app.get_session(&identity, &session_id).await?,
    )?))
}

pub async fn transcript(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
) -> ApiResult<Vec<TranscriptChunk>> {
    Ok(Json(owned(
        state.app.transcript(&identity, &session_id).await?,
    )?))
}

pub async fn start_conversation(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
) -> ApiResult<Value> {
    let audio = state.app.start_conversation(&identity, &session_id).await?;
    Ok(Json(json!({ "audio": encode_audio(&audio) })))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnResponse {
    pub audio: String,
    pub user_transcript: Option<String>,
    pub assistant_response: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioTurnBody {
    pub storage_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TextTurnBody {
    pub text: String,
}

async fn take_turn(
    state: &ServerState,
    identity: &crate::auth::Identity,
    session_id: &str,
    input: TurnInput,
) -> ApiResult<TurnResponse> {
    let output = state.app.take_turn(identity, session_id, input).await?;
    Ok(Json(TurnResponse {
        audio: encode_audio(&output.audio),
        user_transcript: output.user_transcript,
        assistant_response: output.assistant_text,
    }))
}

pub async fn audio_turn(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
    Json(body): Json<AudioTurnBody>,
) -> ApiResult<TurnResponse> {
    let input = TurnInput::Audio {
        storage_id: body.storage_id,
    };
    take_turn(&state, &identity, &session_id, input).await
}

pub async fn text_turn(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
    Json(body): Json<TextTurnBody>,
) -> ApiResult<TurnResponse> {
    let input = TurnInput::Text { text: body.text };
    take_turn(&state, &identity, &session_id, input).await
}

pub async fn end_session(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
) -> ApiResult<FinalizeReport> {
    Ok(Json(state.app.end_session(&identity, &session_id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ResumeBody {
    pub from: FinalizeStep,
}

pub async fn resume_end_session(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(session_id): Path<String>,
    Json(body): Json<ResumeBody>,
) -> ApiResult<FinalizeReport> {
    Ok(Json(
        state
            .app
            .resume_end_session(&identity, &session_id, body.from)
            .await?,
    ))
}

// ---- planner ---------------------------------------------------------------

pub async fn planner_entries(
    State(state): State<ServerState>,
    Caller(identity): Caller,
) -> ApiResult<Vec<PlannerEntry>> {
    Ok(Json(listed(state.app.planner_entries(&identity).await?)))
}

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    pub status: String,
}

pub async fn update_planner_status(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(entry_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult<PlannerEntry> {
    let status = PlannerStatus::parse(&body.status)?;
    Ok(Json(
        state
            .app
            .update_planner_status(&identity, &entry_id, status)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotateBody {
    pub notes: Option<String>,
    pub due_date: Option<i64>,
}

pub async fn annotate_planner_entry(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Path(entry_id): Path<String>,
    Json(body): Json<AnnotateBody>,
) -> ApiResult<PlannerEntry> {
    Ok(Json(
        state
            .app
            .annotate_planner_entry(&identity, &entry_id, body.notes, body.due_date)
            .await?,
    ))
}

// ---- storage & knowledge ---------------------------------------------------

pub async fn generate_upload_url(
    State(state): State<ServerState>,
    Caller(identity): Caller,
) -> ApiResult<Value> {
    let url = state.app.generate_upload_url(&identity).await?;
    Ok(Json(json!({ "uploadUrl": url })))
}

/// Raw body PUT to a reserved slot; the token is the credential
pub async fn upload(
    State(state): State<ServerState>,
    Path(token): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Value> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream");

    let storage_id = state.app.upload(&token, content_type, &body).await?;
    tracing::debug!("Stored {} bytes as {}", body.len(), storage_id);
    Ok(Json(json!({ "storageId": storage_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodologyBody {
    pub storage_id: String,
    #[serde(default)]
    pub description: String,
}

pub async fn set_core_methodology(
    State(state): State<ServerState>,
    Caller(identity): Caller,
    Json(body): Json<MethodologyBody>,
) -> ApiResult<KnowledgeDoc> {
    Ok(Json(
        state
            .app
            .set_core_methodology(&identity, &body.storage_id, &body.description)
            .await?,
    ))
}
