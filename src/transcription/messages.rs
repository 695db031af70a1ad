use serde::{Deserialize, Serialize};

/// Transcription request sent to the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionRequest {
    pub audio: String,  // Base64-encoded audio bytes
    pub size_bytes: usize,
    pub timestamp: String,  // RFC3339 timestamp
}

/// Reply from the STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionReply {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f32>,
    /// Set by the service when it could not transcribe the audio
    #[serde(default)]
    pub error: Option<String>,
}
