use super::record::{join_transcript, TranscriptionSession};
use super::status::{ConsultationStatus, SessionStatus};
use anyhow::{bail, Result};
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Outcome of a compare-and-set status change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Status changed; carries the previous status
    Applied(SessionStatus),
    /// Current status was not one of the allowed sources
    Rejected(SessionStatus),
    /// No such session
    Missing,
}

/// Persistence for transcription sessions
///
/// Each call is expected to be atomic with respect to the single record it
/// touches. Failures are surfaced to the caller and never retried here.
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Status of the parent consultation, if it exists
    async fn consultation_status(&self, parent_id: &str) -> Result<Option<ConsultationStatus>>;

    /// The parent's session in `starting` or `streaming`, if any
    async fn find_active_by_parent(&self, parent_id: &str) -> Result<Option<TranscriptionSession>>;

    async fn get(&self, id: &str) -> Result<Option<TranscriptionSession>>;

    async fn create(&self, session: &TranscriptionSession) -> Result<()>;

    /// Move to `to` only if the current status is in `from`
    ///
    /// Stamps `ended_at` when `to` is terminal.
    async fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<Transition>;

    /// Update the connection-presence flag and its timestamp
    ///
    /// Returns the session status at the time of the update.
    async fn set_connection(&self, id: &str, connected: bool) -> Result<Option<SessionStatus>>;

    /// Append text to the running transcript, returning the full transcript
    async fn append_transcript(&self, id: &str, text: &str) -> Result<Option<String>>;

    async fn record_error(&self, id: &str, message: &str) -> Result<()>;

    /// Whether the backing store is reachable
    async fn health(&self) -> Result<()> {
        Ok(())
    }
}

/// In-process session store
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, TranscriptionSession>>,
    consultations: RwLock<HashMap<String, ConsultationStatus>>,
    /// Report unregistered consultations as active
    assume_active: bool,
}

impl MemorySessionStore {
    /// Store that only knows consultations passed to `register_consultation`
    pub fn new() -> Self {
        Self::default()
    }

    /// Store for deployments where consultations live elsewhere
    ///
    /// Unregistered consultation ids are reported as active; registered ones
    /// keep their registered status.
    pub fn assume_consultations_active() -> Self {
        Self {
            assume_active: true,
            ..Self::default()
        }
    }

    /// Make a parent consultation known to the store
    pub async fn register_consultation(&self, parent_id: impl Into<String>, status: ConsultationStatus) {
        let mut consultations = self.consultations.write().await;
        consultations.insert(parent_id.into(), status);
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn consultation_status(&self, parent_id: &str) -> Result<Option<ConsultationStatus>> {
        let consultations = self.consultations.read().await;
        match consultations.get(parent_id) {
            Some(status) => Ok(Some(*status)),
            None if self.assume_active => Ok(Some(ConsultationStatus::Active)),
            None => Ok(None),
        }
    }

    async fn find_active_by_parent(&self, parent_id: &str) -> Result<Option<TranscriptionSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .find(|s| s.session_id == parent_id && s.status.is_active())
            .cloned())
    }

    async fn get(&self, id: &str) -> Result<Option<TranscriptionSession>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(id).cloned())
    }

    async fn create(&self, session: &TranscriptionSession) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&session.transcription_session_id) {
            bail!(
                "Transcription session {} already exists",
                session.transcription_session_id
            );
        }
        sessions.insert(session.transcription_session_id.clone(), session.clone());
        Ok(())
    }

    async fn transition(
        &self,
        id: &str,
        from: &[SessionStatus],
        to: SessionStatus,
    ) -> Result<Transition> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(Transition::Missing);
        };

        if !from.contains(&session.status) {
            return Ok(Transition::Rejected(session.status));
        }

        let previous = session.status;
        session.status = to;
        if to.is_terminal() {
            session.ended_at = Some(Utc::now());
        }
        Ok(Transition::Applied(previous))
    }

    async fn set_connection(&self, id: &str, connected: bool) -> Result<Option<SessionStatus>> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };

        session.connected = connected;
        if connected {
            session.connected_at = Some(Utc::now());
        } else {
            session.disconnected_at = Some(Utc::now());
        }
        Ok(Some(session.status))
    }

    async fn append_transcript(&self, id: &str, text: &str) -> Result<Option<String>> {
        let mut sessions = self.sessions.write().await;
        let Some(session) = sessions.get_mut(id) else {
            return Ok(None);
        };

        session.transcript = join_transcript(&session.transcript, text);
        Ok(Some(session.transcript.clone()))
    }

    async fn record_error(&self, id: &str, message: &str) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get_mut(id) {
            session.error_message = Some(message.to_string());
        }
        Ok(())
    }
}
