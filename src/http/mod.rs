//! HTTP API server
//!
//! - POST /v1/transcription/start - Start (or resume) a transcription session
//! - POST /v1/transcription/end - End a session after its chunks drain
//! - GET /v1/transcription/:id - Session status and transcript
//! - GET /v1/transcription/:id/stream - WebSocket audio stream
//! - GET /health - Collaborator health (503 when any check fails)

mod handlers;
mod routes;
mod state;
mod ws;

pub use handlers::{
    EndTranscriptionResponse, ErrorResponse, HealthResponse, StartTranscriptionResponse,
};
pub use routes::create_router;
pub use state::AppState;
