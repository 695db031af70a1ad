use super::delivery::TranscriptDelivery;
use super::tasks::{ActiveTasks, TasksGuard};
use crate::pipeline::{ChunkPipeline, ChunkResult, Sequencer, WorkerPool};
use crate::protocol::{
    close_code, ErrorCode, FramedChunk, Frame, Framer, Outbound, ServerMessage,
    EXPECTED_CHUNK_DURATION_SECONDS, MAX_CHUNK_SIZE_BYTES,
};
use crate::session::{SessionError, SessionManager};
use futures::{Stream, StreamExt};
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Per-connection limits advertised to and enforced on clients
#[derive(Debug, Clone)]
pub struct StreamLimits {
    pub max_chunk_size_bytes: usize,
    pub expected_chunk_duration_seconds: u32,
    /// How long cleanup waits for cancelled chunk tasks
    pub shutdown_grace: Duration,
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
            expected_chunk_duration_seconds: EXPECTED_CHUNK_DURATION_SECONDS,
            shutdown_grace: Duration::from_secs(5),
        }
    }
}

/// Everything a connection needs from the process
pub struct StreamContext {
    pub sessions: Arc<SessionManager>,
    pub pipeline: Arc<ChunkPipeline>,
    pub pool: WorkerPool,
    pub limits: StreamLimits,
}

/// How a connection ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionOutcome {
    /// Refused at connect time
    Rejected(String),
    /// Client went away
    Closed,
    /// Unexpected internal error
    Failed(String),
}

/// Serve one streaming connection until the client leaves
///
/// `inbound` yields frames from the client; everything for the client goes
/// through `outbound`. Cleanup runs on every exit path once the connection
/// has been attached.
pub async fn run_connection<S, E>(
    ctx: Arc<StreamContext>,
    session_id: String,
    mut inbound: S,
    outbound: mpsc::Sender<Outbound>,
) -> ConnectionOutcome
where
    S: Stream<Item = Result<Frame, E>> + Unpin + Send,
    E: Display + Send,
{
    let tasks = Arc::new(ActiveTasks::new());

    if let Err(e) = ctx.sessions.attach(&session_id, Arc::clone(&tasks)).await {
        let (code, outcome) = match &e {
            SessionError::Store(_) => {
                error!("Failed to attach connection to session {}: {}", session_id, e);
                (close_code::INTERNAL_ERROR, ConnectionOutcome::Failed(e.to_string()))
            }
            _ => {
                warn!("Rejecting connection for session {}: {}", session_id, e);
                (close_code::SESSION_REJECTED, ConnectionOutcome::Rejected(e.to_string()))
            }
        };
        let _ = outbound
            .send(Outbound::Close {
                code,
                reason: e.to_string(),
            })
            .await;
        return outcome;
    }

    let delivery = TranscriptDelivery::new(
        Arc::clone(&ctx.sessions),
        session_id.clone(),
        outbound.clone(),
    );

    let connection = Connection {
        sequencer: Arc::new(Sequencer::new(Arc::new(delivery))),
        cancelled: Arc::new(AtomicBool::new(false)),
        ctx,
        session_id,
        tasks,
        outbound,
    };

    connection
        .send(ServerMessage::ConnectionConfirmed {
            transcription_session_id: connection.session_id.clone(),
            max_chunk_size_bytes: connection.ctx.limits.max_chunk_size_bytes,
            expected_chunk_duration_seconds: connection.ctx.limits.expected_chunk_duration_seconds,
        })
        .await;

    let outcome = connection.read_loop(&mut inbound).await;

    connection.cleanup().await;

    if let ConnectionOutcome::Failed(reason) = &outcome {
        if let Err(e) = connection.ctx.sessions.fail(&connection.session_id, reason).await {
            error!(
                "Failed to mark session {} as failed: {}",
                connection.session_id, e
            );
        }
        let _ = connection
            .outbound
            .send(Outbound::Close {
                code: close_code::INTERNAL_ERROR,
                reason: "Internal server error".to_string(),
            })
            .await;
    }

    info!(
        "Connection for session {} finished: {:?}",
        connection.session_id, outcome
    );

    outcome
}

struct Connection {
    ctx: Arc<StreamContext>,
    session_id: String,
    tasks: Arc<ActiveTasks>,
    sequencer: Arc<Sequencer>,
    /// Raised on disconnect; chunk tasks stop writing once they see it
    cancelled: Arc<AtomicBool>,
    outbound: mpsc::Sender<Outbound>,
}

impl Connection {
    async fn read_loop<S, E>(&self, inbound: &mut S) -> ConnectionOutcome
    where
        S: Stream<Item = Result<Frame, E>> + Unpin + Send,
        E: Display + Send,
    {
        let mut framer = Framer::new(self.ctx.limits.max_chunk_size_bytes);

        loop {
            match inbound.next().await {
                None | Some(Ok(Frame::Close)) => {
                    info!("Client disconnected from session {}", self.session_id);
                    return ConnectionOutcome::Closed;
                }
                Some(Err(e)) => {
                    warn!("Read error on session {}: {}", self.session_id, e);
                    return ConnectionOutcome::Closed;
                }
                Some(Ok(Frame::Text(text))) => {
                    let reply = framer.handle_text(&text);
                    self.send(reply).await;
                }
                Some(Ok(Frame::Binary(bytes))) => {
                    // Status read and admission share the task lock with the drain check
                    let mut tasks = self.tasks.lock().await;

                    let status = match self.ctx.sessions.status(&self.session_id).await {
                        Ok(status) => status,
                        Err(e) => {
                            error!(
                                "Failed to read status of session {}: {}",
                                self.session_id, e
                            );
                            return ConnectionOutcome::Failed(e.to_string());
                        }
                    };

                    match framer.handle_binary(status, bytes) {
                        Ok(chunk) => self.admit(&mut tasks, chunk),
                        Err(rejection) => {
                            drop(tasks);
                            self.sequencer.skip(rejection.sequence_number).await;
                            self.send(rejection.into_message()).await;
                        }
                    }
                }
            }
        }
    }

    /// Spawn the pipeline for a validated chunk
    fn admit(&self, tasks: &mut TasksGuard<'_>, chunk: FramedChunk) {
        let sequence = chunk.sequence_number;

        info!(
            "Received audio chunk {} ({} bytes) for session {}",
            sequence,
            chunk.bytes.len(),
            self.session_id
        );

        let ctx = Arc::clone(&self.ctx);
        let active = Arc::clone(&self.tasks);
        let sequencer = Arc::clone(&self.sequencer);
        let cancelled = Arc::clone(&self.cancelled);
        let session_id = self.session_id.clone();

        tasks.spawn(sequence, async move {
            let result = match ctx.pool.acquire().await {
                Ok(permit) => {
                    let result = ctx.pipeline.process(&session_id, chunk, &cancelled).await;
                    drop(permit);
                    result
                }
                Err(e) => Some(ChunkResult::Failed {
                    sequence_number: sequence,
                    error_code: ErrorCode::ProcessingError,
                    error_message: format!("Failed to schedule audio chunk {}: {}", sequence, e),
                }),
            };

            if cancelled.load(Ordering::SeqCst) {
                return;
            }

            if let Some(result) = result {
                sequencer.submit(result).await;
            }

            let remaining = active.complete(sequence).await;
            debug!(
                "Chunk {} of session {} done, {} still in flight",
                sequence, session_id, remaining
            );

            if let Err(e) = ctx.sessions.finalize_if_drained(&session_id).await {
                warn!("Drain check failed for session {}: {}", session_id, e);
            }
        });
    }

    async fn send(&self, message: ServerMessage) {
        if self.outbound.send(Outbound::Message(message)).await.is_err() {
            debug!("Connection writer for session {} is gone", self.session_id);
        }
    }

    /// Cancel in-flight chunks, mark the session disconnected and rerun the drain check
    ///
    /// Best-effort: every step logs its failure and moves on.
    async fn cleanup(&self) {
        info!("Cleaning up connection for session {}", self.session_id);

        self.cancelled.store(true, Ordering::SeqCst);

        let handles = self.tasks.take_all().await;
        if !handles.is_empty() {
            for (sequence, handle) in &handles {
                if !handle.is_finished() {
                    debug!("Cancelling background task for chunk {}", sequence);
                    handle.abort();
                }
            }

            info!(
                "Waiting for {} chunk tasks of session {} to cancel",
                handles.len(),
                self.session_id
            );

            let waits = handles.into_iter().map(|(_, handle)| handle);
            let grace = self.ctx.limits.shutdown_grace;
            if tokio::time::timeout(grace, futures::future::join_all(waits))
                .await
                .is_err()
            {
                warn!(
                    "Some chunk tasks of session {} didn't cancel within {:?}",
                    self.session_id, grace
                );
            }
        }

        if let Err(e) = self.ctx.sessions.detach(&self.session_id).await {
            error!(
                "Failed to mark session {} disconnected: {}",
                self.session_id, e
            );
        }

        // Aborted tasks never reach their own drain check
        if let Err(e) = self.ctx.sessions.finalize_if_drained(&self.session_id).await {
            error!(
                "Drain check after disconnect failed for session {}: {}",
                self.session_id, e
            );
        }
    }
}
