//! HTTP API
//!
//! JSON over axum. Identity comes from headers set by the trusted auth
//! proxy (see [`identity`]); everything else is delegated to [`App`].
//!
//! # Endpoints
//!
//! - GET /api/status
//! - /api/users/... - ensure, profile, onboarding, preferences, mind map
//! - /api/sessions/... - create, list, read, transcript, start, turns, end
//! - /api/planner/... - list, status transition, notes / due date
//! - /api/storage/... - upload slot and raw upload
//! - PUT /api/knowledge/core-methodology

pub mod error;
pub mod identity;
pub mod routes;

use anyhow::{Context, Result};
use axum::extract::DefaultBodyLimit;
use axum::http::{HeaderValue, Method};
use axum::routing::{get, patch, post, put};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::app::App;
use crate::secrets::SecretString;

pub use error::ApiError;

/// Largest accepted upload (audio recordings and methodology documents)
pub const MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

/// State shared across handlers
#[derive(Clone)]
pub struct ServerState {
    pub app: Arc<App>,
    /// When set, identity-bearing requests must present it as a bearer token
    pub proxy_secret: Option<SecretString>,
}

impl ServerState {
    pub fn new(app: Arc<App>, proxy_secret: Option<SecretString>) -> Self {
        Self { app, proxy_secret }
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins = if allowed_origins.is_empty() {
        AllowOrigin::any()
    } else {
        let values: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                    None
                }
            })
            .collect();
        AllowOrigin::list(values)
    };

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH])
        .allow_headers(Any)
}

pub fn router(state: ServerState) -> Router {
    let cors = cors_layer(&state.app.config().auth.allowed_origins);

    Router::new()
        .route("/api/status", get(routes::status_handler))
        .route("/api/users/ensure", post(routes::ensure_user))
        .route("/api/users/me", get(routes::my_profile))
        .route("/api/users/me/onboarding", post(routes::save_onboarding))
        .route("/api/users/me/preferences", put(routes::update_preferences))
        .route("/api/users/me/mind-map", get(routes::mind_map))
        .route(
            "/api/sessions",
            post(routes::create_session).get(routes::list_sessions),
        )
        .route("/api/sessions/:id", get(routes::get_session))
        .route("/api/sessions/:id/transcript", get(routes::transcript))
        .route("/api/sessions/:id/start", post(routes::start_conversation))
        .route("/api/sessions/:id/turns/audio", post(routes::audio_turn))
        .route("/api/sessions/:id/turns/text", post(routes::text_turn))
        .route("/api/sessions/:id/end", post(routes::end_session))
        .route("/api/sessions/:id/end/resume", post(routes::resume_end_session))
        .route("/api/planner", get(routes::planner_entries))
        .route("/api/planner/:id", patch(routes::annotate_planner_entry))
        .route("/api/planner/:id/status", patch(routes::update_planner_status))
        .route("/api/storage/upload-url", post(routes::generate_upload_url))
        .route(
            "/api/storage/upload/:token",
            put(routes::upload).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/knowledge/core-methodology",
            put(routes::set_core_methodology),
        )
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Bind `addr` and serve until `shutdown` resolves
pub async fn serve<F>(state: ServerState, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    let local: SocketAddr = listener
        .local_addr()
        .context("Failed to read bound address")?;

    let app = router(state);
    tracing::info!("API server listening on http://{}", local);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("API server error")?;

    tracing::info!("API server shut down gracefully");
    Ok(())
}
