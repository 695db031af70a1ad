use super::handlers;
use super::state::AppState;
use super::ws;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Create the HTTP router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Session lifecycle
        .route("/v1/transcription/start", post(handlers::start_transcription))
        .route("/v1/transcription/end", post(handlers::end_transcription))
        .route(
            "/v1/transcription/:transcription_session_id",
            get(handlers::get_transcription),
        )
        // Audio stream
        .route(
            "/v1/transcription/:transcription_session_id/stream",
            get(ws::stream_transcription),
        )
        // Add tracing middleware for request logging
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
