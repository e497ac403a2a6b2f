use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use sdk::errors::{EngineError, ErrorExt};
use serde_json::json;

/// Error returned by every handler
///
/// Wraps the service layer's `anyhow::Error` and recovers the typed
/// [`EngineError`] from its chain to choose the status code.
#[derive(Debug)]
pub struct ApiError(anyhow::Error);

impl<E> From<E> for ApiError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub fn status_for(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::Unauthorized => StatusCode::UNAUTHORIZED,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::InvalidInput(_) | EngineError::UnsupportedAudio(_) => StatusCode::BAD_REQUEST,
        EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Transcription(_) | EngineError::Synthesis(_) | EngineError::LLMProvider(_) => {
            StatusCode::BAD_GATEWAY
        }
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn engine_error(err: &anyhow::Error) -> Option<&EngineError> {
    err.chain().find_map(|cause| cause.downcast_ref::<EngineError>())
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match engine_error(&self.0) {
            Some(engine_err) => {
                let status = status_for(engine_err);
                if status.is_server_error() {
                    tracing::error!("Request failed: {:#}", self.0);
                } else {
                    tracing::debug!("Request rejected: {}", engine_err);
                }
                (
                    status,
                    Json(json!({
                        "error": engine_err.to_string(),
                        "hint": engine_err.user_hint(),
                    })),
                )
                    .into_response()
            }
            None => {
                tracing::error!("Unhandled error: {:#}", self.0);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": "Internal server error",
                        "hint": "Something went wrong on our side. Try again shortly",
                    })),
                )
                    .into_response()
            }
        }
    }
}
