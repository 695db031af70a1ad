use super::status::SessionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A real-time transcription session tied to one consultation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionSession {
    /// Unique transcription session identifier
    pub transcription_session_id: String,

    /// Parent consultation session
    pub session_id: String,

    pub status: SessionStatus,

    pub started_at: DateTime<Utc>,

    /// Set once the session reaches a terminal status
    pub ended_at: Option<DateTime<Utc>>,

    /// Whether a streaming connection is currently attached
    pub connected: bool,

    pub connected_at: Option<DateTime<Utc>>,

    pub disconnected_at: Option<DateTime<Utc>>,

    /// Transcript accumulated so far, in chunk order
    pub transcript: String,

    pub error_message: Option<String>,
}

impl TranscriptionSession {
    pub fn new(parent_session_id: impl Into<String>) -> Self {
        Self {
            transcription_session_id: uuid::Uuid::new_v4().to_string(),
            session_id: parent_session_id.into(),
            status: SessionStatus::Starting,
            started_at: Utc::now(),
            ended_at: None,
            connected: false,
            connected_at: None,
            disconnected_at: None,
            transcript: String::new(),
            error_message: None,
        }
    }
}

/// One stored audio chunk, written once by the pipeline that created it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioChunk {
    pub chunk_id: String,

    pub transcription_session_id: String,

    /// Order in the audio stream (0, 1, 2...)
    pub sequence_number: u64,

    /// Location of the raw bytes in the chunk store
    pub blob_path: String,

    pub size_bytes: usize,

    /// Duration advertised by the client
    pub duration_seconds: f64,

    pub uploaded_at: DateTime<Utc>,
}

/// Join a new piece of text onto a transcript with a single space
pub fn join_transcript(existing: &str, addition: &str) -> String {
    if existing.is_empty() {
        addition.to_string()
    } else if addition.is_empty() {
        existing.to_string()
    } else {
        format!("{} {}", existing, addition)
    }
}
