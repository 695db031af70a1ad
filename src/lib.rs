pub mod config;
pub mod http;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod stream;
pub mod transcription;

pub use config::Config;
pub use http::{create_router, AppState};
pub use pipeline::{ChunkPipeline, ChunkResult, Sequencer, WorkerPool};
pub use protocol::{ErrorCode, Frame, Framer, Outbound, ServerMessage};
pub use session::{
    MemorySessionStore, SessionError, SessionManager, SessionStatus, SessionStore,
    TranscriptionSession,
};
pub use storage::{ChunkStore, FsChunkStore};
pub use stream::{run_connection, ConnectionOutcome, StreamContext, StreamLimits};
pub use transcription::{NatsTranscriber, Transcriber};
