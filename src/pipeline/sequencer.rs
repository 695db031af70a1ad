// Reordering buffer for chunk results
//
// Chunks finish in any order but must reach the client in sequence order.
// Each result is inserted and the buffer drained inside one critical section:
// while the slot at the cursor is present it is delivered, removed and the
// cursor advances. A missing slot stalls delivery until that chunk finishes.
//
// Sequence numbers consumed by a validation failure never produce a result;
// the connection marks them skipped so they don't stall the cursor.

use crate::protocol::ErrorCode;
use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Outcome of one admitted chunk
#[derive(Debug, Clone, PartialEq)]
pub enum ChunkResult {
    Transcribed {
        sequence_number: u64,
        partial_transcript: String,
        processing_time_ms: u64,
    },
    Failed {
        sequence_number: u64,
        error_code: ErrorCode,
        error_message: String,
    },
}

impl ChunkResult {
    pub fn sequence_number(&self) -> u64 {
        match self {
            ChunkResult::Transcribed {
                sequence_number, ..
            }
            | ChunkResult::Failed {
                sequence_number, ..
            } => *sequence_number,
        }
    }
}

/// Receives results in sequence order
///
/// An error means the connection is gone.
#[async_trait::async_trait]
pub trait Delivery: Send + Sync {
    async fn deliver(&self, result: ChunkResult) -> Result<()>;
}

enum Slot {
    Ready(ChunkResult),
    Skipped,
}

struct SequencerState {
    buffer: BTreeMap<u64, Slot>,
    next_to_send: u64,
    closed: bool,
}

pub struct Sequencer {
    state: Mutex<SequencerState>,
    delivery: Arc<dyn Delivery>,
}

impl Sequencer {
    pub fn new(delivery: Arc<dyn Delivery>) -> Self {
        Self {
            state: Mutex::new(SequencerState {
                buffer: BTreeMap::new(),
                next_to_send: 0,
                closed: false,
            }),
            delivery,
        }
    }

    /// Buffer a result and deliver everything that is now in order
    ///
    /// Returns the number of results delivered by this call.
    pub async fn submit(&self, result: ChunkResult) -> usize {
        let sequence = result.sequence_number();
        self.insert_and_drain(sequence, Slot::Ready(result)).await
    }

    /// Mark a sequence number that will never produce a result
    pub async fn skip(&self, sequence: u64) -> usize {
        self.insert_and_drain(sequence, Slot::Skipped).await
    }

    async fn insert_and_drain(&self, sequence: u64, slot: Slot) -> usize {
        let mut state = self.state.lock().await;

        if state.closed {
            debug!("Sequencer closed, dropping result for chunk {}", sequence);
            return 0;
        }

        if sequence < state.next_to_send || state.buffer.contains_key(&sequence) {
            warn!("Duplicate result for chunk {} ignored", sequence);
            return 0;
        }

        state.buffer.insert(sequence, slot);

        let mut delivered = 0;
        loop {
            let next = state.next_to_send;
            let Some(slot) = state.buffer.remove(&next) else {
                break;
            };
            state.next_to_send += 1;

            let Slot::Ready(result) = slot else {
                continue;
            };

            if let Err(e) = self.delivery.deliver(result).await {
                warn!(
                    "Failed to deliver chunk {}, dropping {} buffered results: {}",
                    next,
                    state.buffer.len(),
                    e
                );
                state.buffer.clear();
                state.closed = true;
                break;
            }
            delivered += 1;
        }

        delivered
    }

    /// Next sequence number eligible for delivery
    pub async fn next_to_send(&self) -> u64 {
        self.state.lock().await.next_to_send
    }

    /// Results waiting behind a gap
    pub async fn buffered(&self) -> usize {
        self.state.lock().await.buffer.len()
    }

    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}
