use super::record::TranscriptionSession;
use super::status::{ConsultationStatus, SessionStatus};
use super::store::{SessionStore, Transition};
use crate::stream::ActiveTasks;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Transcription session {0} not found")]
    NotFound(String),

    #[error("Consultation session {0} not found")]
    ParentNotFound(String),

    #[error("Consultation session {0} is not active")]
    ParentNotActive(String),

    #[error("Transcription session {0} already ended")]
    AlreadyEnded(String),

    #[error("Transcription session {id} is {status}, not accepting connections")]
    NotConnectable { id: String, status: SessionStatus },

    #[error("Transcription session {0} already has a live connection")]
    AlreadyConnected(String),

    #[error("session store error: {0}")]
    Store(#[from] anyhow::Error),
}

/// Owns the lifecycle of transcription sessions
///
/// Status changes go through the store's compare-and-set so that the end
/// request, the connection supervisor and chunk completions can race without
/// losing a transition. Live connections register their [`ActiveTasks`] here
/// so the drain check can see outstanding work.
pub struct SessionManager {
    store: Arc<dyn SessionStore>,

    /// Serializes start requests so the find-then-create check stays idempotent
    start_lock: Mutex<()>,

    /// Live connections (transcription_session_id → in-flight chunk tasks)
    connections: RwLock<HashMap<String, Arc<ActiveTasks>>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            start_lock: Mutex::new(()),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Start transcribing a consultation, or return its already-active session
    pub async fn start(&self, parent_id: &str) -> Result<TranscriptionSession, SessionError> {
        let _guard = self.start_lock.lock().await;

        match self.store.consultation_status(parent_id).await? {
            None => return Err(SessionError::ParentNotFound(parent_id.to_string())),
            Some(ConsultationStatus::Active) => {}
            Some(_) => return Err(SessionError::ParentNotActive(parent_id.to_string())),
        }

        if let Some(existing) = self.store.find_active_by_parent(parent_id).await? {
            info!(
                "Consultation {} already has active transcription session {}",
                parent_id, existing.transcription_session_id
            );
            return Ok(existing);
        }

        let session = TranscriptionSession::new(parent_id);
        self.store.create(&session).await?;

        info!(
            "Created transcription session {} for consultation {}",
            session.transcription_session_id, parent_id
        );

        Ok(session)
    }

    /// Request the end of a session
    ///
    /// The session moves to `ending` right away and to `completed` once its
    /// connection (if any) has no chunks in flight. Returns the status after
    /// the request.
    pub async fn end(&self, id: &str) -> Result<SessionStatus, SessionError> {
        match self
            .store
            .transition(id, &SessionStatus::ACTIVE, SessionStatus::Ending)
            .await?
        {
            Transition::Applied(previous) => {
                info!("Transcription session {} ending (was {})", id, previous);
            }
            Transition::Rejected(_) => return Err(SessionError::AlreadyEnded(id.to_string())),
            Transition::Missing => return Err(SessionError::NotFound(id.to_string())),
        }

        self.finalize_if_drained(id).await?;

        Ok(self.status(id).await?.unwrap_or(SessionStatus::Ending))
    }

    /// Complete an `ending` session once nothing is left in flight
    ///
    /// Holds the connection's task lock across the emptiness check and the
    /// status change, so no chunk can be admitted in between.
    pub async fn finalize_if_drained(&self, id: &str) -> Result<bool, SessionError> {
        let tasks = {
            let connections = self.connections.read().await;
            connections.get(id).cloned()
        };

        let _guard = match &tasks {
            Some(tasks) => {
                let guard = tasks.lock().await;
                if !guard.is_empty() {
                    return Ok(false);
                }
                Some(guard)
            }
            None => None,
        };

        match self
            .store
            .transition(id, &[SessionStatus::Ending], SessionStatus::Completed)
            .await?
        {
            Transition::Applied(_) => {
                info!("Transcription session {} completed", id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub async fn get(&self, id: &str) -> Result<TranscriptionSession, SessionError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    pub async fn status(&self, id: &str) -> Result<Option<SessionStatus>, SessionError> {
        Ok(self.store.get(id).await?.map(|s| s.status))
    }

    /// Attach a streaming connection: validates, registers, marks connected
    pub async fn attach(&self, id: &str, tasks: Arc<ActiveTasks>) -> Result<(), SessionError> {
        let session = self.get(id).await?;
        if !session.status.can_attach() {
            return Err(SessionError::NotConnectable {
                id: id.to_string(),
                status: session.status,
            });
        }

        {
            let mut connections = self.connections.write().await;
            if connections.contains_key(id) {
                return Err(SessionError::AlreadyConnected(id.to_string()));
            }
            connections.insert(id.to_string(), tasks);
        }

        if let Err(e) = self.mark_connected(id).await {
            self.connections.write().await.remove(id);
            return Err(e);
        }

        info!("Connection attached to transcription session {}", id);
        Ok(())
    }

    async fn mark_connected(&self, id: &str) -> Result<(), SessionError> {
        self.store.set_connection(id, true).await?;
        if let Transition::Rejected(status) = self
            .store
            .transition(id, &[SessionStatus::Starting], SessionStatus::Streaming)
            .await?
        {
            if status != SessionStatus::Streaming {
                warn!(
                    "Transcription session {} is {} after attach, leaving it untouched",
                    id, status
                );
            }
        }
        Ok(())
    }

    /// Detach the connection: clears the presence flag and reverts `streaming`
    pub async fn detach(&self, id: &str) -> Result<(), SessionError> {
        self.connections.write().await.remove(id);

        if let Some(status) = self.store.set_connection(id, false).await? {
            let next = status.after_disconnect();
            if next != status {
                self.store.transition(id, &[status], next).await?;
                info!("Transcription session {} reverted {} -> {}", id, status, next);
            }
        }

        info!("Connection detached from transcription session {}", id);
        Ok(())
    }

    /// Append chunk text to the stored transcript, returning the full transcript
    pub async fn append_transcript(&self, id: &str, text: &str) -> Result<String, SessionError> {
        self.store
            .append_transcript(id, text)
            .await?
            .ok_or_else(|| SessionError::NotFound(id.to_string()))
    }

    /// Mark a session failed after an unrecoverable error
    pub async fn fail(&self, id: &str, message: &str) -> Result<(), SessionError> {
        self.store.record_error(id, message).await?;
        self.store
            .transition(
                id,
                &[
                    SessionStatus::Starting,
                    SessionStatus::Streaming,
                    SessionStatus::Ending,
                ],
                SessionStatus::Failed,
            )
            .await?;
        warn!("Transcription session {} failed: {}", id, message);
        Ok(())
    }

    /// Number of chunks in flight on the session's live connection
    pub async fn in_flight(&self, id: &str) -> usize {
        let tasks = {
            let connections = self.connections.read().await;
            connections.get(id).cloned()
        };
        match tasks {
            Some(tasks) => tasks.len().await,
            None => 0,
        }
    }

    /// Reachability of the session store
    pub async fn health(&self) -> anyhow::Result<()> {
        self.store.health().await
    }

    pub async fn is_connected(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }
}
