use super::state::AppState;
use crate::error::LiveError;
use crate::session::{ChatEntry, GroundingLink, SessionSignals, SessionStats, UserProfile};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    pub user_name: String,
    pub subject: String,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub status: String,
    pub stats: SessionStats,
}

#[derive(Debug, Serialize)]
pub struct SessionStatusResponse {
    pub signals: SessionSignals,
    pub intensity: f32,
    pub stats: SessionStats,
}

#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub summary: String,
}

#[derive(Debug, Deserialize)]
pub struct AbandonRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

fn live_error_status(err: &LiveError) -> StatusCode {
    match err {
        LiveError::AlreadyRunning => StatusCode::CONFLICT,
        LiveError::NotRunning => StatusCode::NOT_FOUND,
        LiveError::MicrophoneUnavailable(_) | LiveError::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
        LiveError::Capture(_) | LiveError::DriverStopped => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn anyhow_response(err: anyhow::Error) -> Response {
    let status = err
        .downcast_ref::<LiveError>()
        .map(live_error_status)
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        error!("Request failed: {:#}", err);
    }
    error_response(status, format!("{:#}", err))
}

fn ok(status: &str, message: impl Into<String>) -> Response {
    (
        StatusCode::OK,
        Json(StatusMessage {
            status: status.to_string(),
            message: message.into(),
        }),
    )
        .into_response()
}

fn not_running() -> Response {
    anyhow_response(LiveError::NotRunning.into())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /session/start
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> Response {
    info!("Starting session for {} ({})", req.user_name, req.subject);

    let profile = UserProfile {
        user_name: req.user_name,
        subject: req.subject,
    };

    match state.start_session(profile).await {
        Ok(()) => ok("connecting", "Live session started"),
        Err(e) => anyhow_response(e),
    }
}

/// POST /session/reset
pub async fn reset_session(State(state): State<AppState>) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    match session.reset().await {
        Ok(()) => ok("connecting", "Live session reset"),
        Err(e) => anyhow_response(e.into()),
    }
}

/// POST /session/stop
pub async fn stop_session(State(state): State<AppState>) -> Response {
    match state.stop_session().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(StopSessionResponse {
                status: "stopped".to_string(),
                stats,
            }),
        )
            .into_response(),
        Err(e) => anyhow_response(e),
    }
}

/// GET /session/status
pub async fn session_status(State(state): State<AppState>) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    let signals = session.signals();
    let intensity = signals.intensity();
    (
        StatusCode::OK,
        Json(SessionStatusResponse {
            signals,
            intensity,
            stats: session.stats(),
        }),
    )
        .into_response()
}

/// GET /session/history
pub async fn session_history(State(state): State<AppState>) -> Response {
    let session = state.session.read().await;
    match session.as_ref() {
        Some(session) => {
            let history: Vec<ChatEntry> = session.history();
            (StatusCode::OK, Json(history)).into_response()
        }
        None => not_running(),
    }
}

/// GET /session/links
pub async fn session_links(State(state): State<AppState>) -> Response {
    let session = state.session.read().await;
    match session.as_ref() {
        Some(session) => {
            let links: Vec<GroundingLink> = session.grounding_links();
            (StatusCode::OK, Json(links)).into_response()
        }
        None => not_running(),
    }
}

/// POST /session/documents/:name/begin
pub async fn begin_document(State(state): State<AppState>, Path(name): Path<String>) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    match session.begin_document(name.clone()).await {
        Ok(()) => ok("analyzing", format!("Ingested {}", name)),
        Err(e) => anyhow_response(e.into()),
    }
}

/// POST /session/documents/:name/summary
pub async fn complete_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<SummaryRequest>,
) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    match session.complete_document(name.clone(), req.summary).await {
        Ok(()) => ok("delivered", format!("Summary of {} sent", name)),
        Err(e) => anyhow_response(e.into()),
    }
}

/// POST /session/documents/:name/abandon
pub async fn abandon_document(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<AbandonRequest>,
) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    match session.abandon_document(name.clone(), req.reason).await {
        Ok(()) => ok("abandoned", format!("Analysis of {} abandoned", name)),
        Err(e) => anyhow_response(e.into()),
    }
}

/// POST /session/text
pub async fn inject_text(State(state): State<AppState>, Json(req): Json<TextRequest>) -> Response {
    let session = state.session.read().await;
    let Some(session) = session.as_ref() else {
        return not_running();
    };

    match session.inject_text(req.text).await {
        Ok(()) => ok("sent", "Text injected"),
        Err(e) => anyhow_response(e.into()),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
