//! Streaming connection supervision
//!
//! One read loop per connection routes frames through the framer, spawns a
//! pipeline task per admitted chunk and, on disconnect, cancels what is still
//! in flight before marking the session disconnected.

mod delivery;
mod supervisor;
mod tasks;

pub use delivery::TranscriptDelivery;
pub use supervisor::{run_connection, ConnectionOutcome, StreamContext, StreamLimits};
pub use tasks::{ActiveTasks, TasksGuard};
