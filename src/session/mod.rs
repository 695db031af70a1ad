//! Transcription session lifecycle
//!
//! This module provides:
//! - `SessionStatus`: the starting → streaming → ending → completed/failed state machine
//! - `TranscriptionSession` / `AudioChunk`: the stored records
//! - `SessionStore`: the persistence seam, with an in-memory implementation
//! - `SessionManager`: start/end/attach/detach and the drain-before-complete check

mod manager;
mod record;
mod status;
mod store;

pub use manager::{SessionError, SessionManager};
pub use record::{join_transcript, AudioChunk, TranscriptionSession};
pub use status::{ConsultationStatus, SessionStatus};
pub use store::{MemorySessionStore, SessionStore, Transition};
