use crate::session::SessionManager;
use crate::stream::StreamContext;
use std::sync::Arc;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Session lifecycle (start/end/lookup)
    pub sessions: Arc<SessionManager>,

    /// Shared pieces handed to every streaming connection
    pub stream: Arc<StreamContext>,

    /// Capacity of each connection's outbound queue
    pub outbound_buffer: usize,
}

impl AppState {
    pub fn new(stream: Arc<StreamContext>, outbound_buffer: usize) -> Self {
        Self {
            sessions: Arc::clone(&stream.sessions),
            stream,
            outbound_buffer: outbound_buffer.max(1),
        }
    }
}
