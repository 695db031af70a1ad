use crate::session::AudioChunk;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Opaque location of stored chunk bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkHandle(pub String);

impl ChunkHandle {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Durable storage for raw audio chunks and their records
#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist raw bytes for one chunk
    ///
    /// Sequence numbers restart on every connection, so `chunk_id` keeps
    /// chunks from a resumed session apart.
    async fn put(
        &self,
        session_id: &str,
        sequence: u64,
        chunk_id: &str,
        bytes: &[u8],
    ) -> Result<ChunkHandle>;

    /// Read back previously stored bytes
    async fn get(&self, handle: &ChunkHandle) -> Result<Vec<u8>>;

    /// Persist the chunk record
    async fn record(&self, chunk: &AudioChunk) -> Result<()>;

    /// Whether the store can currently accept chunks
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// Chunk store backed by a local directory
///
/// Layout: `<root>/<session>/chunk-<seq>-<chunk_id>.bin`, with one JSON record per line
/// in `<root>/<session>/chunks.jsonl`.
pub struct FsChunkStore {
    root: PathBuf,
}

impl FsChunkStore {
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();

        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("Failed to create chunk directory: {:?}", root))?;

        info!("Chunk store initialized at {:?}", root);

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn session_dir(&self, session_id: &str) -> PathBuf {
        self.root.join(session_id)
    }
}

#[async_trait::async_trait]
impl ChunkStore for FsChunkStore {
    async fn put(
        &self,
        session_id: &str,
        sequence: u64,
        chunk_id: &str,
        bytes: &[u8],
    ) -> Result<ChunkHandle> {
        let dir = self.session_dir(session_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("Failed to create session directory: {:?}", dir))?;

        let path = dir.join(format!("chunk-{:06}-{}.bin", sequence, chunk_id));
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write chunk: {:?}", path))?;

        debug!("Stored chunk {} ({} bytes) at {:?}", sequence, bytes.len(), path);

        Ok(ChunkHandle(path.to_string_lossy().into_owned()))
    }

    async fn get(&self, handle: &ChunkHandle) -> Result<Vec<u8>> {
        tokio::fs::read(handle.as_str())
            .await
            .with_context(|| format!("Failed to read chunk: {}", handle.as_str()))
    }

    async fn record(&self, chunk: &AudioChunk) -> Result<()> {
        let path = self
            .session_dir(&chunk.transcription_session_id)
            .join("chunks.jsonl");

        let mut line = serde_json::to_vec(chunk)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("Failed to open chunk log: {:?}", path))?;
        file.write_all(&line)
            .await
            .context("Failed to append chunk record")?;
        file.flush().await?;

        Ok(())
    }

    async fn health(&self) -> Result<()> {
        let metadata = tokio::fs::metadata(&self.root)
            .await
            .with_context(|| format!("Chunk directory unavailable: {:?}", self.root))?;
        if !metadata.is_dir() {
            bail!("Chunk root {:?} is not a directory", self.root);
        }
        Ok(())
    }
}
