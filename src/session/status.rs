use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a transcription session
///
/// ```text
/// starting ──attach──▶ streaming ──end──▶ ending ──drain──▶ completed
///    ▲                     │
///    └─────disconnect──────┘            (any) ──internal error──▶ failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Created by a start request, no connection attached yet
    Starting,
    /// A connection is attached and audio is accepted
    Streaming,
    /// End requested, waiting for in-flight chunks to drain
    Ending,
    /// Terminal: all work drained
    Completed,
    /// Terminal: unrecoverable error
    Failed,
}

impl SessionStatus {
    /// Statuses that count as the parent's one active session
    pub const ACTIVE: [SessionStatus; 2] = [SessionStatus::Starting, SessionStatus::Streaming];

    pub fn is_active(self) -> bool {
        Self::ACTIVE.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    /// Ending, completed or failed: no new audio is accepted
    pub fn is_ended(self) -> bool {
        matches!(
            self,
            SessionStatus::Ending | SessionStatus::Completed | SessionStatus::Failed
        )
    }

    /// A connection may only attach to an active session
    pub fn can_attach(self) -> bool {
        self.is_active()
    }

    /// Status after the connection goes away
    pub fn after_disconnect(self) -> SessionStatus {
        match self {
            SessionStatus::Streaming => SessionStatus::Starting,
            other => other,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Starting => "starting",
            SessionStatus::Streaming => "streaming",
            SessionStatus::Ending => "ending",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the parent consultation session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsultationStatus {
    Active,
    Closed,
    Archived,
}
