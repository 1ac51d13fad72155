use std::sync::Arc;
use std::time::Duration;

use cb_core::config::DelegationConfig;
use cb_core::session_name::{SessionName, ValidationError};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::registry::{RegistryError, SessionRegistry};

/// Number of task-id characters used in a delegated session's name.
pub const TASK_FRAGMENT_LEN: usize = 8;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("invalid session name for task: {0}")]
    Validation(#[from] ValidationError),

    #[error("provisioning failed: {0}")]
    Provisioning(RegistryError),

    #[error("agent in {session} did not become ready within {waited:?}")]
    NotReady { session: String, waited: Duration },
}

impl From<RegistryError> for DelegationError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Validation(e) => DelegationError::Validation(e),
            other => DelegationError::Provisioning(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, DelegationError>;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// The first [`TASK_FRAGMENT_LEN`] characters of a task id.
pub fn task_fragment(task_id: &str) -> &str {
    match task_id.char_indices().nth(TASK_FRAGMENT_LEN) {
        Some((idx, _)) => &task_id[..idx],
        None => task_id,
    }
}

/// Drop ASCII control characters (including newlines and ESC) and cap the
/// prompt at `max_chars` characters.
///
/// The prompt is typed into a live shell, so a stray newline would submit
/// early and an escape sequence could drive the terminal.
pub fn sanitize_prompt(prompt: &str, max_chars: usize) -> String {
    prompt
        .chars()
        .filter(|c| !matches!(*c, '\u{00}'..='\u{1F}' | '\u{7F}'))
        .take(max_chars)
        .collect()
}

// ---------------------------------------------------------------------------
// Delegator
// ---------------------------------------------------------------------------

/// Provisions a session for a task and starts an agent inside it.
pub struct Delegator {
    registry: Arc<SessionRegistry>,
    config: DelegationConfig,
}

impl Delegator {
    pub fn new(registry: Arc<SessionRegistry>, config: DelegationConfig) -> Self {
        Self { registry, config }
    }

    pub fn config(&self) -> &DelegationConfig {
        &self.config
    }

    /// The deterministic session name for `task_id`.
    pub fn session_name_for(&self, task_id: &str) -> Result<SessionName> {
        Ok(self.registry.prefix().name_for(task_fragment(task_id))?)
    }

    /// Create the task's session, launch the agent, wait for it, and type
    /// the sanitized prompt.
    ///
    /// A failure at any step aborts. A session created before the failure is
    /// left running for the shutdown reaper or an explicit kill.
    pub async fn delegate(&self, task_id: &str, prompt: &str) -> Result<SessionName> {
        let name = self.session_name_for(task_id)?;
        info!(task_id, session = %name, "delegating task");

        self.registry.create_session(name.as_str()).await?;
        self.registry
            .send_keys(name.as_str(), &self.config.agent_command)
            .await?;

        self.wait_until_ready(&name).await?;

        let prompt = sanitize_prompt(prompt, self.config.prompt_max_chars);
        self.registry.send_keys(name.as_str(), &prompt).await?;

        info!(task_id, session = %name, prompt_chars = prompt.chars().count(), "task delegated");
        Ok(name)
    }

    async fn wait_until_ready(&self, name: &SessionName) -> Result<()> {
        let Some(marker) = self.config.ready_marker.as_deref() else {
            debug!(session = %name, settle = ?self.config.settle(), "waiting for agent to settle");
            tokio::time::sleep(self.config.settle()).await;
            return Ok(());
        };

        let started = Instant::now();
        let deadline = started + self.config.ready_timeout();
        loop {
            let pane = self.registry.capture_pane(name.as_str()).await?;
            if pane.contains(marker) {
                debug!(session = %name, waited = ?started.elapsed(), "agent ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                warn!(session = %name, marker, "agent never printed its ready marker");
                return Err(DelegationError::NotReady {
                    session: name.to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.config.ready_poll()).await;
        }
    }
}

impl std::fmt::Debug for Delegator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegator")
            .field("registry", &self.registry)
            .field("agent_command", &self.config.agent_command)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
