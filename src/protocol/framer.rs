// Chunk framing for the streaming connection
//
// Clients send an `audio_chunk_metadata` text frame followed by one binary
// frame holding the audio. The framer assigns every binary frame the next
// sequence number in arrival order, pairs it with the metadata stored for
// that number and validates it. A rejected frame still consumes its number,
// so client and server never disagree about which chunk comes next.

use super::messages::{AudioChunkMetadata, ErrorCode, ServerMessage};
use crate::session::SessionStatus;
use std::collections::HashMap;
use tracing::{debug, warn};

/// How far ahead of the next binary frame metadata may be announced
///
/// Bounds the pending table: at most this many entries per connection.
pub const MAX_METADATA_LOOKAHEAD: u64 = 32;

/// Advertised size and duration, held until the binary frame arrives
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMetadata {
    pub chunk_size_bytes: usize,
    pub duration_seconds: f64,
}

/// A binary frame that passed validation
#[derive(Debug, Clone, PartialEq)]
pub struct FramedChunk {
    pub sequence_number: u64,
    pub bytes: Vec<u8>,
    pub duration_seconds: f64,
}

/// A binary frame that failed validation
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub sequence_number: u64,
    pub code: ErrorCode,
    pub message: String,
}

impl Rejection {
    fn new(sequence_number: u64, code: ErrorCode, message: String) -> Self {
        Self {
            sequence_number,
            code,
            message,
        }
    }

    pub fn into_message(self) -> ServerMessage {
        ServerMessage::error(self.code, self.message, Some(self.sequence_number))
    }
}

/// Per-connection framing state
pub struct Framer {
    expected_sequence: u64,
    pending: HashMap<u64, PendingMetadata>,
    max_chunk_size_bytes: usize,
}

impl Framer {
    pub fn new(max_chunk_size_bytes: usize) -> Self {
        Self {
            expected_sequence: 0,
            pending: HashMap::new(),
            max_chunk_size_bytes,
        }
    }

    /// Sequence number the next binary frame will be assigned
    pub fn expected_sequence(&self) -> u64 {
        self.expected_sequence
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Handle a text frame, returning the reply to send back
    pub fn handle_text(&mut self, text: &str) -> ServerMessage {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(_) => {
                return ServerMessage::error(ErrorCode::InvalidJson, "Invalid JSON format", None)
            }
        };

        let message_type = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_owned);

        match message_type.as_deref() {
            Some("audio_chunk_metadata") => match serde_json::from_value(value) {
                Ok(metadata) => self.store_metadata(metadata),
                Err(e) => ServerMessage::error(
                    ErrorCode::InvalidMetadata,
                    format!("Invalid audio chunk metadata: {}", e),
                    None,
                ),
            },
            Some(other) => ServerMessage::error(
                ErrorCode::UnknownMessageType,
                format!("Unknown message type '{}'", other),
                None,
            ),
            None => ServerMessage::error(
                ErrorCode::UnknownMessageType,
                "Message is missing a 'type' field",
                None,
            ),
        }
    }

    fn store_metadata(&mut self, metadata: AudioChunkMetadata) -> ServerMessage {
        let sequence_number = metadata.sequence_number;

        if sequence_number < self.expected_sequence {
            return ServerMessage::error(
                ErrorCode::InvalidMetadata,
                format!(
                    "Sequence {} was already consumed, next expected is {}",
                    sequence_number, self.expected_sequence
                ),
                Some(sequence_number),
            );
        }

        if sequence_number - self.expected_sequence >= MAX_METADATA_LOOKAHEAD {
            return ServerMessage::error(
                ErrorCode::InvalidMetadata,
                format!(
                    "Sequence {} is too far ahead, next expected is {}",
                    sequence_number, self.expected_sequence
                ),
                Some(sequence_number),
            );
        }

        self.pending.insert(
            sequence_number,
            PendingMetadata {
                chunk_size_bytes: metadata.chunk_size_bytes,
                duration_seconds: metadata.duration_seconds,
            },
        );
        debug!("Stored metadata for sequence {}", sequence_number);

        ServerMessage::ChunkMetadataReceived { sequence_number }
    }

    /// Handle a binary frame given the session's current status
    ///
    /// Always consumes one sequence number and its pending metadata.
    pub fn handle_binary(
        &mut self,
        status: Option<SessionStatus>,
        bytes: Vec<u8>,
    ) -> Result<FramedChunk, Rejection> {
        let sequence = self.expected_sequence;
        self.expected_sequence += 1;

        let metadata = self.pending.remove(&sequence);
        self.pending.retain(|&seq, _| seq > sequence);

        let result = self.validate(sequence, status, metadata, bytes);
        if let Err(rejection) = &result {
            warn!(
                "Rejected chunk {}: {:?} ({})",
                sequence, rejection.code, rejection.message
            );
        }
        result
    }

    fn validate(
        &self,
        sequence: u64,
        status: Option<SessionStatus>,
        metadata: Option<PendingMetadata>,
        bytes: Vec<u8>,
    ) -> Result<FramedChunk, Rejection> {
        match status {
            None => {
                return Err(Rejection::new(
                    sequence,
                    ErrorCode::SessionNotFound,
                    "Transcription session not found".to_string(),
                ))
            }
            Some(status) if status.is_ended() => {
                return Err(Rejection::new(
                    sequence,
                    ErrorCode::SessionEnding,
                    format!("Session status is '{}', not accepting new audio", status),
                ))
            }
            Some(SessionStatus::Streaming) => {}
            Some(status) => {
                return Err(Rejection::new(
                    sequence,
                    ErrorCode::SessionNotStreaming,
                    format!("Session status is '{}', expected 'streaming'", status),
                ))
            }
        }

        let Some(metadata) = metadata else {
            return Err(Rejection::new(
                sequence,
                ErrorCode::MissingMetadata,
                format!("No metadata received for audio chunk sequence {}", sequence),
            ));
        };

        let size = metadata.chunk_size_bytes.max(bytes.len());
        if size > self.max_chunk_size_bytes {
            return Err(Rejection::new(
                sequence,
                ErrorCode::ChunkTooLarge,
                format!(
                    "Audio chunk size {} bytes exceeds maximum {} bytes",
                    size, self.max_chunk_size_bytes
                ),
            ));
        }

        if bytes.len() != metadata.chunk_size_bytes {
            return Err(Rejection::new(
                sequence,
                ErrorCode::SizeMismatch,
                format!(
                    "Binary chunk size {} bytes doesn't match metadata size {} bytes",
                    bytes.len(),
                    metadata.chunk_size_bytes
                ),
            ));
        }

        Ok(FramedChunk {
            sequence_number: sequence,
            bytes,
            duration_seconds: metadata.duration_seconds,
        })
    }
}
