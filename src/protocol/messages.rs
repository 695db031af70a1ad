use serde::{Deserialize, Serialize};

/// Largest audio chunk accepted on a connection (1 MiB)
pub const MAX_CHUNK_SIZE_BYTES: usize = 1_048_576;

/// Chunk duration clients are asked to target
pub const EXPECTED_CHUNK_DURATION_SECONDS: u32 = 8;

/// WebSocket close codes used by the stream endpoint
pub mod close_code {
    pub const NORMAL: u16 = 1000;
    pub const INTERNAL_ERROR: u16 = 1011;
    /// Session missing or in the wrong state at connect time
    pub const SESSION_REJECTED: u16 = 4000;
}

/// Error codes carried by `error` messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidJson,
    InvalidMetadata,
    MissingMetadata,
    SizeMismatch,
    ChunkTooLarge,
    SessionNotFound,
    SessionNotStreaming,
    SessionEnding,
    UnknownMessageType,
    ProcessingError,
}

/// Server → client control message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    ConnectionConfirmed {
        transcription_session_id: String,
        max_chunk_size_bytes: usize,
        expected_chunk_duration_seconds: u32,
    },
    ChunkMetadataReceived {
        sequence_number: u64,
    },
    TranscriptUpdate {
        sequence_number: u64,
        partial_transcript: String,
        full_transcript: String,
        processing_time_ms: u64,
    },
    Error {
        error_code: ErrorCode,
        error_message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sequence_number: Option<u64>,
    },
}

impl ServerMessage {
    pub fn error(code: ErrorCode, message: impl Into<String>, sequence_number: Option<u64>) -> Self {
        ServerMessage::Error {
            error_code: code,
            error_message: message.into(),
            sequence_number,
        }
    }

    pub fn sequence_number(&self) -> Option<u64> {
        match self {
            ServerMessage::ConnectionConfirmed { .. } => None,
            ServerMessage::ChunkMetadataReceived { sequence_number }
            | ServerMessage::TranscriptUpdate {
                sequence_number, ..
            } => Some(*sequence_number),
            ServerMessage::Error {
                sequence_number, ..
            } => *sequence_number,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ServerMessage::Error { error_code, .. } => Some(*error_code),
            _ => None,
        }
    }
}

/// `audio_chunk_metadata` control frame sent ahead of each binary chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioChunkMetadata {
    pub sequence_number: u64,
    pub chunk_size_bytes: usize,
    pub duration_seconds: f64,
}

/// Inbound frame, independent of the transport
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

/// Outbound item handed to the connection writer
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(ServerMessage),
    Close { code: u16, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_message_serialization() {
        let msg = ServerMessage::error(ErrorCode::SizeMismatch, "bad size", Some(3));
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"error\""));
        assert!(json.contains("\"error_code\":\"SIZE_MISMATCH\""));
        assert!(json.contains("\"sequence_number\":3"));
    }

    #[test]
    fn test_error_without_sequence_omits_field() {
        let msg = ServerMessage::error(ErrorCode::InvalidJson, "Invalid JSON format", None);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("sequence_number"));
    }

    #[test]
    fn test_connection_confirmed_serialization() {
        let msg = ServerMessage::ConnectionConfirmed {
            transcription_session_id: "abc".to_string(),
            max_chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
            expected_chunk_duration_seconds: EXPECTED_CHUNK_DURATION_SECONDS,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"connection_confirmed\""));
        assert!(json.contains("\"max_chunk_size_bytes\":1048576"));
        assert!(json.contains("\"expected_chunk_duration_seconds\":8"));
    }

    #[test]
    fn test_metadata_deserialization() {
        let json = r#"{
            "type": "audio_chunk_metadata",
            "sequence_number": 4,
            "chunk_size_bytes": 64000,
            "duration_seconds": 8.0
        }"#;

        let metadata: AudioChunkMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.sequence_number, 4);
        assert_eq!(metadata.chunk_size_bytes, 64000);
        assert_eq!(metadata.duration_seconds, 8.0);
    }
}
