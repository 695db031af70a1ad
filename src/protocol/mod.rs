//! Wire protocol for the transcription stream
//!
//! - `messages`: JSON control messages in both directions, error codes, close codes
//! - `framer`: metadata/binary pairing and per-chunk validation

pub mod framer;
pub mod messages;

pub use framer::{
    FramedChunk, Framer, PendingMetadata, Rejection, MAX_METADATA_LOOKAHEAD,
};
pub use messages::{
    close_code, AudioChunkMetadata, ErrorCode, Frame, Outbound, ServerMessage,
    EXPECTED_CHUNK_DURATION_SECONDS, MAX_CHUNK_SIZE_BYTES,
};
