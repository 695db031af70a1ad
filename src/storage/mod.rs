pub mod chunks;

pub use chunks::{ChunkHandle, ChunkStore, FsChunkStore};
