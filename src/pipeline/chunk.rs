use super::sequencer::ChunkResult;
use crate::protocol::{ErrorCode, FramedChunk};
use crate::session::AudioChunk;
use crate::storage::ChunkStore;
use crate::transcription::Transcriber;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// Store → transcribe for one admitted chunk
///
/// Every failure becomes a [`ChunkResult::Failed`] for the same sequence
/// number so the sequencer never waits on a chunk that will not arrive.
/// The running transcript is appended when the result is delivered in order,
/// not here.
pub struct ChunkPipeline {
    chunks: Arc<dyn ChunkStore>,
    transcriber: Arc<dyn Transcriber>,
}

impl ChunkPipeline {
    pub fn new(chunks: Arc<dyn ChunkStore>, transcriber: Arc<dyn Transcriber>) -> Self {
        Self {
            chunks,
            transcriber,
        }
    }

    pub async fn check_chunk_store(&self) -> Result<()> {
        self.chunks.health().await
    }

    pub async fn check_transcriber(&self) -> Result<()> {
        self.transcriber.health().await
    }

    /// Process a chunk; `None` if `cancelled` was raised along the way
    pub async fn process(
        &self,
        session_id: &str,
        chunk: FramedChunk,
        cancelled: &AtomicBool,
    ) -> Option<ChunkResult> {
        let started = Instant::now();
        let sequence_number = chunk.sequence_number;

        match self.run(session_id, chunk, cancelled).await {
            Ok(Some(text)) => {
                let processing_time_ms = started.elapsed().as_millis() as u64;
                info!(
                    "Chunk {} of session {} transcribed in {}ms",
                    sequence_number, session_id, processing_time_ms
                );
                Some(ChunkResult::Transcribed {
                    sequence_number,
                    partial_transcript: text,
                    processing_time_ms,
                })
            }
            Ok(None) => {
                debug!(
                    "Chunk {} of session {} cancelled",
                    sequence_number, session_id
                );
                None
            }
            Err(e) => {
                error!(
                    "Chunk {} of session {} failed: {:#}",
                    sequence_number, session_id, e
                );
                Some(ChunkResult::Failed {
                    sequence_number,
                    error_code: ErrorCode::ProcessingError,
                    error_message: format!(
                        "Failed to process audio chunk {}: {:#}",
                        sequence_number, e
                    ),
                })
            }
        }
    }

    async fn run(
        &self,
        session_id: &str,
        chunk: FramedChunk,
        cancelled: &AtomicBool,
    ) -> Result<Option<String>> {
        let chunk_id = uuid::Uuid::new_v4().to_string();
        let handle = self
            .chunks
            .put(session_id, chunk.sequence_number, &chunk_id, &chunk.bytes)
            .await
            .context("Failed to store audio chunk")?;

        if cancelled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let record = AudioChunk {
            chunk_id,
            transcription_session_id: session_id.to_string(),
            sequence_number: chunk.sequence_number,
            blob_path: handle.as_str().to_string(),
            size_bytes: chunk.bytes.len(),
            duration_seconds: chunk.duration_seconds,
            uploaded_at: Utc::now(),
        };
        self.chunks
            .record(&record)
            .await
            .context("Failed to record audio chunk")?;

        if cancelled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let audio = self
            .chunks
            .get(&handle)
            .await
            .context("Failed to read stored audio chunk")?;

        let text = self
            .transcriber
            .transcribe(&audio)
            .await
            .context("Transcription failed")?;

        if cancelled.load(Ordering::SeqCst) {
            return Ok(None);
        }

        Ok(Some(text.trim().to_string()))
    }
}
