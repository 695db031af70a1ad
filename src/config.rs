use crate::protocol::{EXPECTED_CHUNK_DURATION_SECONDS, MAX_CHUNK_SIZE_BYTES};
use crate::stream::StreamLimits;
use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub storage: StorageConfig,
    pub transcription: TranscriptionConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    pub max_chunk_size_bytes: usize,
    pub expected_chunk_duration_seconds: u32,
    /// Process-wide cap on chunks processed at once
    pub worker_pool_size: usize,
    /// Grace period for cancelling chunk tasks on disconnect
    pub shutdown_grace_ms: u64,
    /// Capacity of each connection's outbound message queue
    pub outbound_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_chunk_size_bytes: MAX_CHUNK_SIZE_BYTES,
            expected_chunk_duration_seconds: EXPECTED_CHUNK_DURATION_SECONDS,
            worker_pool_size: 5,
            shutdown_grace_ms: 5000,
            outbound_buffer: 64,
        }
    }
}

impl StreamConfig {
    pub fn limits(&self) -> StreamLimits {
        StreamLimits {
            max_chunk_size_bytes: self.max_chunk_size_bytes,
            expected_chunk_duration_seconds: self.expected_chunk_duration_seconds,
            shutdown_grace: Duration::from_millis(self.shutdown_grace_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StorageConfig {
    pub chunks_path: String,
}

#[derive(Debug, Deserialize)]
pub struct TranscriptionConfig {
    pub nats_url: String,
    pub subject: String,
    pub timeout_secs: u64,
}

impl Config {
    /// Load from `path` (any format the `config` crate knows, extension optional),
    /// overridden by `SCRIBE__SECTION__KEY` environment variables
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SCRIBE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
