use super::messages::{TranscriptionReply, TranscriptionRequest};
use super::Transcriber;
use anyhow::{bail, Context, Result};
use async_nats::connection::State;
use async_nats::Client;
use base64::Engine;
use std::time::Duration;
use tracing::{debug, info};

/// Speech-to-text over NATS request/reply
pub struct NatsTranscriber {
    client: Client,
    subject: String,
    timeout: Duration,
}

impl NatsTranscriber {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject: String, timeout: Duration) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully (transcription subject: {})", subject);

        Ok(Self {
            client,
            subject,
            timeout,
        })
    }
}

#[async_trait::async_trait]
impl Transcriber for NatsTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String> {
        let request = TranscriptionRequest {
            audio: base64::engine::general_purpose::STANDARD.encode(audio),
            size_bytes: audio.len(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        let payload = serde_json::to_vec(&request)?;

        let message = tokio::time::timeout(
            self.timeout,
            self.client.request(self.subject.clone(), payload.into()),
        )
        .await
        .context("Transcription request timed out")?
        .context("Transcription request failed")?;

        let reply: TranscriptionReply = serde_json::from_slice(&message.payload)
            .context("Failed to parse transcription reply")?;

        if let Some(error) = reply.error {
            bail!("Transcription service error: {}", error);
        }

        debug!(
            "Transcribed {} bytes (confidence={:?}, chars={})",
            audio.len(),
            reply.confidence,
            reply.text.len()
        );

        Ok(reply.text)
    }

    async fn health(&self) -> Result<()> {
        match self.client.connection_state() {
            State::Connected => Ok(()),
            state => bail!("NATS connection is {:?}", state),
        }
    }
}
