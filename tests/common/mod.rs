// Shared fixtures for integration tests: mock speech-to-text collaborators
// and a harness that drives a streaming connection over in-memory channels.

#![allow(dead_code)]

use anyhow::{bail, Result};
use futures::channel::mpsc as frame_channel;
use rand::Rng;
use scribe_stream::protocol::{Frame, Outbound, ServerMessage};
use scribe_stream::session::ConsultationStatus;
use scribe_stream::{
    run_connection, ChunkPipeline, ConnectionOutcome, FsChunkStore, MemorySessionStore,
    SessionManager, SessionStatus, StreamContext, StreamLimits, Transcriber, WorkerPool,
};
use std::convert::Infallible;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

pub const CONSULTATION: &str = "consult-1";

/// Transcribes a chunk to `chunk-<first byte>` after a random delay,
/// tracking how many calls are in flight
pub struct EchoTranscriber {
    max_delay_ms: u64,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub calls: AtomicUsize,
}

impl EchoTranscriber {
    pub fn new(max_delay_ms: u64) -> Self {
        Self {
            max_delay_ms,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl Transcriber for EchoTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = if self.max_delay_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=self.max_delay_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay)).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match audio.first() {
            Some(0xFF) => bail!("speech service unavailable"),
            Some(id) => Ok(format!("chunk-{}", id)),
            None => Ok(String::new()),
        }
    }
}

/// Blocks every call until the test hands out a permit
pub struct GatedTranscriber {
    pub gate: Semaphore,
}

impl GatedTranscriber {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
        }
    }

    pub fn release(&self, calls: usize) {
        self.gate.add_permits(calls);
    }
}

#[async_trait::async_trait]
impl Transcriber for GatedTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        self.gate.acquire().await?.forget();
        Ok(format!("chunk-{}", audio.first().copied().unwrap_or_default()))
    }
}

pub struct Harness {
    pub store: Arc<MemorySessionStore>,
    pub sessions: Arc<SessionManager>,
    pub ctx: Arc<StreamContext>,
    chunks_dir: TempDir,
}

impl Harness {
    pub async fn new(transcriber: Arc<dyn Transcriber>, pool_size: usize) -> Result<Self> {
        let chunks_dir = TempDir::new()?;
        let chunks = FsChunkStore::new(chunks_dir.path()).await?;

        let store = Arc::new(MemorySessionStore::new());
        store
            .register_consultation(CONSULTATION, ConsultationStatus::Active)
            .await;
        let sessions = Arc::new(SessionManager::new(store.clone()));

        let ctx = Arc::new(StreamContext {
            sessions: Arc::clone(&sessions),
            pipeline: Arc::new(ChunkPipeline::new(Arc::new(chunks), transcriber)),
            pool: WorkerPool::new(pool_size),
            limits: StreamLimits {
                shutdown_grace: Duration::from_millis(500),
                ..StreamLimits::default()
            },
        });

        Ok(Self {
            store,
            sessions,
            ctx,
            chunks_dir,
        })
    }

    /// Start a session for a fresh consultation
    pub async fn start_session(&self, consultation: &str) -> Result<String> {
        self.store
            .register_consultation(consultation, ConsultationStatus::Active)
            .await;
        Ok(self.sessions.start(consultation).await?.transcription_session_id)
    }

    pub fn connect(&self, session_id: &str) -> Client {
        connect_to(&self.ctx, session_id)
    }

    /// Directory the harness chunk store writes into
    pub fn chunks_root(&self) -> &Path {
        self.chunks_dir.path()
    }
}

/// Open an in-memory connection against any stream context
pub fn connect_to(ctx: &Arc<StreamContext>, session_id: &str) -> Client {
    let (frames, inbound) = frame_channel::unbounded::<Result<Frame, Infallible>>();
    let (outbound, messages) = mpsc::channel(256);
    let task = tokio::spawn(run_connection(
        Arc::clone(ctx),
        session_id.to_string(),
        inbound,
        outbound,
    ));

    Client {
        frames: Some(frames),
        messages,
        task,
    }
}

/// Client side of an in-memory connection
pub struct Client {
    frames: Option<frame_channel::UnboundedSender<Result<Frame, Infallible>>>,
    pub messages: mpsc::Receiver<Outbound>,
    pub task: JoinHandle<ConnectionOutcome>,
}

impl Client {
    pub fn send_text(&self, text: String) {
        if let Some(frames) = &self.frames {
            frames.unbounded_send(Ok(Frame::Text(text))).unwrap();
        }
    }

    pub fn send_metadata(&self, sequence: u64, size: usize) {
        self.send_text(metadata(sequence, size));
    }

    pub fn send_binary(&self, bytes: Vec<u8>) {
        if let Some(frames) = &self.frames {
            frames.unbounded_send(Ok(Frame::Binary(bytes))).unwrap();
        }
    }

    /// Metadata plus a chunk whose first byte identifies it
    pub fn send_chunk(&self, sequence: u64, id: u8, size: usize) {
        self.send_metadata(sequence, size);
        let mut bytes = vec![0u8; size];
        bytes[0] = id;
        self.send_binary(bytes);
    }

    /// Drop the inbound side, ending the read loop
    pub async fn disconnect(&mut self) -> Result<ConnectionOutcome> {
        self.frames.take();
        Ok((&mut self.task).await?)
    }

    pub async fn next(&mut self) -> Result<Outbound> {
        match tokio::time::timeout(Duration::from_secs(5), self.messages.recv()).await {
            Ok(Some(item)) => Ok(item),
            Ok(None) => bail!("connection closed"),
            Err(_) => bail!("timed out waiting for a message"),
        }
    }

    pub async fn next_message(&mut self) -> Result<ServerMessage> {
        match self.next().await? {
            Outbound::Message(message) => Ok(message),
            other => bail!("expected a message, got {:?}", other),
        }
    }

    /// Next message that is not a metadata acknowledgement
    pub async fn next_result(&mut self) -> Result<ServerMessage> {
        loop {
            let message = self.next_message().await?;
            if !matches!(message, ServerMessage::ChunkMetadataReceived { .. }) {
                return Ok(message);
            }
        }
    }
}

pub fn metadata(sequence: u64, size: usize) -> String {
    format!(
        r#"{{"type":"audio_chunk_metadata","sequence_number":{},"chunk_size_bytes":{},"duration_seconds":8.0}}"#,
        sequence, size
    )
}

/// Wait until the session has `count` chunks in flight
pub async fn wait_in_flight(sessions: &SessionManager, id: &str, count: usize) -> bool {
    for _ in 0..200 {
        if sessions.in_flight(id).await == count {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Wait until the session reaches `status`
pub async fn wait_status(sessions: &SessionManager, id: &str, status: SessionStatus) -> bool {
    for _ in 0..200 {
        if let Ok(Some(current)) = sessions.status(id).await {
            if current == status {
                return true;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
