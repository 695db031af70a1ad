use crate::pipeline::{ChunkResult, Delivery};
use crate::protocol::{ErrorCode, Outbound, ServerMessage};
use crate::session::SessionManager;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::error;

/// Delivers in-order chunk results to one connection
///
/// Runs inside the sequencer's critical section, so transcript appends happen
/// in sequence order as well.
pub struct TranscriptDelivery {
    sessions: Arc<SessionManager>,
    session_id: String,
    outbound: mpsc::Sender<Outbound>,
}

impl TranscriptDelivery {
    pub fn new(
        sessions: Arc<SessionManager>,
        session_id: String,
        outbound: mpsc::Sender<Outbound>,
    ) -> Self {
        Self {
            sessions,
            session_id,
            outbound,
        }
    }
}

#[async_trait::async_trait]
impl Delivery for TranscriptDelivery {
    async fn deliver(&self, result: ChunkResult) -> Result<()> {
        let message = match result {
            ChunkResult::Transcribed {
                sequence_number,
                partial_transcript,
                processing_time_ms,
            } => match self
                .sessions
                .append_transcript(&self.session_id, &partial_transcript)
                .await
            {
                Ok(full_transcript) => ServerMessage::TranscriptUpdate {
                    sequence_number,
                    partial_transcript,
                    full_transcript,
                    processing_time_ms,
                },
                Err(e) => {
                    error!(
                        "Failed to append transcript for chunk {} of session {}: {}",
                        sequence_number, self.session_id, e
                    );
                    ServerMessage::error(
                        ErrorCode::ProcessingError,
                        format!("Failed to update transcript for chunk {}", sequence_number),
                        Some(sequence_number),
                    )
                }
            },
            ChunkResult::Failed {
                sequence_number,
                error_code,
                error_message,
            } => ServerMessage::error(error_code, error_message, Some(sequence_number)),
        };

        self.outbound
            .send(Outbound::Message(message))
            .await
            .context("Connection writer closed")
    }
}
