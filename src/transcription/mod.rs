pub mod client;
pub mod messages;

pub use client::NatsTranscriber;
pub use messages::{TranscriptionReply, TranscriptionRequest};

use anyhow::Result;

/// Speech-to-text call for a single audio chunk
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &[u8]) -> Result<String>;

    /// Whether the service is reachable
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}
