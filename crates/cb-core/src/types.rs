use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sessions
// ---------------------------------------------------------------------------

/// One tmux session as observed through `tmux list-sessions`.
///
/// cerebro does not own this state; it is a snapshot of the multiplexer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub name: String,
    /// Some tmux client currently has the session open. Informational only.
    pub attached: bool,
}

// ---------------------------------------------------------------------------
// Delegation
// ---------------------------------------------------------------------------

/// Body of `POST /api/tmux/delegate`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegateRequest {
    pub task_id: String,
    pub prompt: String,
}

/// Response of `POST /api/tmux/delegate`.
///
/// The caller stores `session_name` on its task record. That link is a weak
/// reference: the session outlives or predeceases the task independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelegateResponse {
    pub task_id: String,
    pub session_name: String,
}

/// A task's link to the session working on it.
///
/// The link does not own the session. Deleting the task leaves the session
/// running, and killing the session leaves a stale name here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub task_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmux_session: Option<String>,
}

impl TaskRef {
    pub fn new(task_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            tmux_session: None,
        }
    }

    /// True when the linked session is among `live`.
    pub fn session_is_live(&self, live: &[SessionInfo]) -> bool {
        self.tmux_session
            .as_deref()
            .is_some_and(|name| live.iter().any(|s| s.name == name))
    }
}

impl From<DelegateResponse> for TaskRef {
    fn from(resp: DelegateResponse) -> Self {
        Self {
            task_id: resp.task_id,
            tmux_session: Some(resp.session_name),
        }
    }
}

// ---------------------------------------------------------------------------
// Terminal control frames
// ---------------------------------------------------------------------------

/// Structured messages a terminal client may send over `/ws/terminal`.
///
/// Only `resize` exists today. Anything that does not decode as one of these
/// is raw terminal input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    Resize { cols: u16, rows: u16 },
}
