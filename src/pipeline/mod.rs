//! Chunk processing
//!
//! - `pool`: the process-wide admission gate
//! - `chunk`: store → transcribe for one chunk
//! - `sequencer`: in-order delivery of out-of-order results

pub mod chunk;
pub mod pool;
pub mod sequencer;

pub use chunk::ChunkPipeline;
pub use pool::WorkerPool;
pub use sequencer::{ChunkResult, Delivery, Sequencer};
