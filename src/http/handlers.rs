use super::state::AppState;
use crate::session::{SessionError, SessionStatus, TranscriptionSession};
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartTranscriptionRequest {
    /// Consultation session to start transcribing
    pub session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartTranscriptionResponse {
    pub success: bool,
    pub message: String,
    pub transcription_session_id: String,
}

#[derive(Debug, Deserialize)]
pub struct EndTranscriptionRequest {
    pub transcription_session_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EndTranscriptionResponse {
    pub success: bool,
    pub message: String,
    /// `ending` while chunks are still in flight, otherwise `completed`
    pub status: SessionStatus,
}

#[derive(Debug, Serialize)]
pub struct TranscriptionView {
    #[serde(flatten)]
    pub session: TranscriptionSession,

    /// Chunks still being processed on the live connection
    pub chunks_in_flight: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `healthy` when every check passed
    pub status: String,
    pub module: String,
    /// Check name → `connected` or `error: ...`
    pub checks: BTreeMap<String, String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: String) -> Response {
    (status, Json(ErrorResponse { error })).into_response()
}

/// Validation failures are the caller's fault, store failures are ours
fn session_error_response(e: SessionError, context: &str) -> Response {
    match &e {
        SessionError::Store(_) => {
            error!("{}: {}", context, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, context.to_string())
        }
        _ => error_response(StatusCode::BAD_REQUEST, e.to_string()),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/transcription/start
/// Start (or return the active) transcription session for a consultation
pub async fn start_transcription(
    State(state): State<AppState>,
    Json(req): Json<StartTranscriptionRequest>,
) -> impl IntoResponse {
    info!("Starting transcription for consultation: {}", req.session_id);

    match state.sessions.start(&req.session_id).await {
        Ok(session) => {
            let location = format!("/v1/transcription/{}", session.transcription_session_id);
            (
                StatusCode::CREATED,
                [(header::LOCATION, location)],
                Json(StartTranscriptionResponse {
                    success: true,
                    message: "Transcription session started successfully".to_string(),
                    transcription_session_id: session.transcription_session_id,
                }),
            )
                .into_response()
        }
        Err(e) => session_error_response(e, "Failed to start transcription session"),
    }
}

/// POST /v1/transcription/end
/// End a transcription session once its in-flight chunks drain
pub async fn end_transcription(
    State(state): State<AppState>,
    Json(req): Json<EndTranscriptionRequest>,
) -> impl IntoResponse {
    info!(
        "Ending transcription session: {}",
        req.transcription_session_id
    );

    match state.sessions.end(&req.transcription_session_id).await {
        Ok(status) => (
            StatusCode::OK,
            Json(EndTranscriptionResponse {
                success: true,
                message: "Transcription session ended successfully".to_string(),
                status,
            }),
        )
            .into_response(),
        Err(e) => session_error_response(e, "Failed to end transcription session"),
    }
}

/// GET /v1/transcription/:transcription_session_id
/// Current status and transcript of a session
pub async fn get_transcription(
    State(state): State<AppState>,
    Path(transcription_session_id): Path<String>,
) -> impl IntoResponse {
    match state.sessions.get(&transcription_session_id).await {
        Ok(session) => {
            let chunks_in_flight = state.sessions.in_flight(&transcription_session_id).await;
            (
                StatusCode::OK,
                Json(TranscriptionView {
                    session,
                    chunks_in_flight,
                }),
            )
                .into_response()
        }
        Err(SessionError::NotFound(id)) => error_response(
            StatusCode::NOT_FOUND,
            format!("Transcription session {} not found", id),
        ),
        Err(e) => session_error_response(e, "Failed to load transcription session"),
    }
}

/// GET /health
/// Reachability of the session store, chunk store and speech-to-text service
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let results = [
        ("session_store", state.sessions.health().await),
        ("chunk_store", state.stream.pipeline.check_chunk_store().await),
        ("transcriber", state.stream.pipeline.check_transcriber().await),
    ];

    let mut healthy = true;
    let mut checks = BTreeMap::new();
    for (name, result) in results {
        let outcome = match result {
            Ok(()) => "connected".to_string(),
            Err(e) => {
                warn!("Health check {} failed: {:#}", name, e);
                healthy = false;
                format!("error: {:#}", e)
            }
        };
        checks.insert(name.to_string(), outcome);
    }

    let (code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            module: "transcription".to_string(),
            checks,
        }),
    )
}
