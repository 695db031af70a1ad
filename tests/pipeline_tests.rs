// Integration tests for the per-chunk pipeline and the filesystem chunk store

mod common;

use anyhow::Result;
use common::EchoTranscriber;
use scribe_stream::pipeline::ChunkResult;
use scribe_stream::protocol::{ErrorCode, FramedChunk};
use scribe_stream::session::AudioChunk;
use scribe_stream::storage::{ChunkHandle, ChunkStore, FsChunkStore};
use scribe_stream::ChunkPipeline;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn chunk(sequence_number: u64, first: u8, size: usize) -> FramedChunk {
    let mut bytes = vec![0u8; size];
    bytes[0] = first;
    FramedChunk {
        sequence_number,
        bytes,
        duration_seconds: 8.0,
    }
}

#[tokio::test]
async fn test_pipeline_transcribes_and_stores_chunk() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(FsChunkStore::new(temp_dir.path()).await?);
    let transcriber = Arc::new(EchoTranscriber::new(0));
    let pipeline = ChunkPipeline::new(store.clone(), transcriber.clone());

    let result = pipeline
        .process("session-a", chunk(3, 42, 128), &AtomicBool::new(false))
        .await;

    match result {
        Some(ChunkResult::Transcribed {
            sequence_number,
            partial_transcript,
            ..
        }) => {
            assert_eq!(sequence_number, 3);
            assert_eq!(partial_transcript, "chunk-42");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    // A record line was written and its blob holds the bytes
    let session_dir = temp_dir.path().join("session-a");
    let records = std::fs::read_to_string(session_dir.join("chunks.jsonl"))?;
    let lines: Vec<&str> = records.lines().collect();
    assert_eq!(lines.len(), 1);
    let record: serde_json::Value = serde_json::from_str(lines[0])?;
    assert_eq!(record["sequence_number"], 3);
    assert_eq!(record["size_bytes"], 128);
    assert_eq!(record["transcription_session_id"], "session-a");

    let blob_path = record["blob_path"].as_str().unwrap_or_default().to_string();
    let chunk_id = record["chunk_id"].as_str().unwrap_or_default().to_string();
    assert!(blob_path.ends_with(&format!("chunk-000003-{}.bin", chunk_id)));
    let stored = std::fs::read(&blob_path)?;
    assert_eq!(stored.len(), 128);
    assert_eq!(stored[0], 42);

    Ok(())
}

#[tokio::test]
async fn test_pipeline_reports_transcription_failure() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(FsChunkStore::new(temp_dir.path()).await?);
    let pipeline = ChunkPipeline::new(store, Arc::new(EchoTranscriber::new(0)));

    let result = pipeline
        .process("session-a", chunk(5, 0xFF, 16), &AtomicBool::new(false))
        .await;

    match result {
        Some(ChunkResult::Failed {
            sequence_number,
            error_code,
            error_message,
        }) => {
            assert_eq!(sequence_number, 5);
            assert_eq!(error_code, ErrorCode::ProcessingError);
            assert!(error_message.starts_with("Failed to process audio chunk 5"));
            assert!(error_message.contains("speech service unavailable"));
        }
        other => panic!("unexpected result: {:?}", other),
    }

    Ok(())
}

#[tokio::test]
async fn test_pipeline_cancelled_before_transcription() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = Arc::new(FsChunkStore::new(temp_dir.path()).await?);
    let transcriber = Arc::new(EchoTranscriber::new(0));
    let pipeline = ChunkPipeline::new(store, transcriber.clone());

    let result = pipeline
        .process("session-a", chunk(0, 1, 16), &AtomicBool::new(true))
        .await;

    assert!(result.is_none());
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);

    Ok(())
}

#[tokio::test]
async fn test_chunk_store_roundtrip_and_missing_handle() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FsChunkStore::new(temp_dir.path().join("nested/chunks")).await?;
    assert!(store.root().exists());

    let handle = store.put("session-b", 12, "abc", b"pcm-bytes").await?;
    assert!(handle.as_str().ends_with("chunk-000012-abc.bin"));
    assert_eq!(store.get(&handle).await?, b"pcm-bytes".to_vec());

    let missing = ChunkHandle(
        temp_dir
            .path()
            .join("nope.bin")
            .to_string_lossy()
            .into_owned(),
    );
    assert!(store.get(&missing).await.is_err());

    Ok(())
}

#[tokio::test]
async fn test_chunk_store_keeps_reused_sequence_numbers_apart() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let store = FsChunkStore::new(temp_dir.path()).await?;

    // Same session and sequence, as after a reconnect
    let first = store.put("session-c", 0, "first", &[11]).await?;
    let second = store.put("session-c", 0, "second", &[22]).await?;

    assert_ne!(first, second);
    assert_eq!(store.get(&first).await?, vec![11]);
    assert_eq!(store.get(&second).await?, vec![22]);

    Ok(())
}

/// Raises the cancel flag while the bytes are being stored
struct CancellingStore {
    inner: FsChunkStore,
    cancelled: Arc<AtomicBool>,
    records: AtomicUsize,
}

#[async_trait::async_trait]
impl ChunkStore for CancellingStore {
    async fn put(
        &self,
        session_id: &str,
        sequence: u64,
        chunk_id: &str,
        bytes: &[u8],
    ) -> Result<ChunkHandle> {
        let handle = self.inner.put(session_id, sequence, chunk_id, bytes).await?;
        self.cancelled.store(true, Ordering::SeqCst);
        Ok(handle)
    }

    async fn get(&self, handle: &ChunkHandle) -> Result<Vec<u8>> {
        self.inner.get(handle).await
    }

    async fn record(&self, chunk: &AudioChunk) -> Result<()> {
        self.records.fetch_add(1, Ordering::SeqCst);
        self.inner.record(chunk).await
    }
}

#[tokio::test]
async fn test_pipeline_stops_after_store_when_cancelled() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let cancelled = Arc::new(AtomicBool::new(false));
    let store = Arc::new(CancellingStore {
        inner: FsChunkStore::new(temp_dir.path()).await?,
        cancelled: Arc::clone(&cancelled),
        records: AtomicUsize::new(0),
    });
    let transcriber = Arc::new(EchoTranscriber::new(0));
    let pipeline = ChunkPipeline::new(store.clone(), transcriber.clone());

    let result = pipeline.process("session-d", chunk(0, 1, 16), &cancelled).await;

    assert!(result.is_none());
    assert_eq!(store.records.load(Ordering::SeqCst), 0);
    assert_eq!(transcriber.calls.load(Ordering::SeqCst), 0);

    Ok(())
}
