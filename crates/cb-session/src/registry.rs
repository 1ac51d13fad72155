use std::sync::Arc;

use cb_core::session_name::{SessionName, SessionPrefix, ValidationError};
use cb_core::types::SessionInfo;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::pty::TermSize;
use crate::tmux::{
    capture_pane_args, kill_session_args, list_sessions_args, new_session_args,
    parse_session_lines, send_keys_args, TmuxOutput, TmuxRunner,
};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The name is not ours. Raised before any subprocess runs.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// tmux could not be run, or ran and refused the operation.
    #[error("tmux {op} failed: {detail}")]
    Provisioning { op: &'static str, detail: String },
}

pub type Result<T> = std::result::Result<T, RegistryError>;

fn provisioning(op: &'static str, detail: impl Into<String>) -> RegistryError {
    RegistryError::Provisioning {
        op,
        detail: detail.into(),
    }
}

// ---------------------------------------------------------------------------
// SessionRegistry
// ---------------------------------------------------------------------------

/// Validated facade over the tmux sessions cerebro owns.
///
/// Every operation takes the session name as an untrusted string and checks
/// it against the reserved prefix here, so no caller can reach tmux with a
/// name that belongs to someone else.
pub struct SessionRegistry {
    prefix: SessionPrefix,
    runner: Arc<dyn TmuxRunner>,
    geometry: TermSize,
}

impl SessionRegistry {
    pub fn new(prefix: SessionPrefix, runner: Arc<dyn TmuxRunner>) -> Self {
        Self {
            prefix,
            runner,
            geometry: TermSize::default(),
        }
    }

    /// Override the geometry used for new sessions.
    pub fn with_geometry(mut self, geometry: TermSize) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn prefix(&self) -> &SessionPrefix {
        &self.prefix
    }

    pub fn geometry(&self) -> TermSize {
        self.geometry
    }

    pub fn runner(&self) -> &Arc<dyn TmuxRunner> {
        &self.runner
    }

    pub fn validate(&self, raw: &str) -> std::result::Result<SessionName, ValidationError> {
        self.prefix.parse(raw)
    }

    async fn run(&self, op: &'static str, args: Vec<String>) -> Result<TmuxOutput> {
        self.runner
            .run(&args)
            .await
            .map_err(|e| provisioning(op, e.to_string()))
    }

    /// All live sessions carrying the reserved prefix.
    ///
    /// tmux exits non-zero when no server is running or no sessions exist;
    /// that is reported as an empty list, not an error.
    pub async fn list_sessions(&self) -> Result<Vec<SessionInfo>> {
        let output = self.run("list-sessions", list_sessions_args()).await?;
        if !output.success {
            debug!(stderr = %output.stderr.trim(), "tmux list-sessions exited non-zero, treating as empty");
            return Ok(Vec::new());
        }

        let sessions = parse_session_lines(&output.stdout)
            .into_iter()
            .filter(|(name, _)| self.prefix.matches(name))
            .map(|(name, attached)| SessionInfo { name, attached })
            .collect();
        Ok(sessions)
    }

    /// Start a new detached session at the configured geometry.
    pub async fn create_session(&self, name: &str) -> Result<SessionName> {
        let name = self.validate(name)?;
        let output = self
            .run("new-session", new_session_args(&name, self.geometry))
            .await?;
        if !output.success {
            return Err(provisioning("new-session", output.stderr.trim()));
        }
        info!(session = %name, cols = self.geometry.cols, rows = self.geometry.rows, "created tmux session");
        Ok(name)
    }

    /// Kill a session by exact name.
    ///
    /// Returns `Ok(false)` without touching tmux when `name` is not ours,
    /// and `Ok(false)` when tmux reports no such session.
    pub async fn kill_session(&self, name: &str) -> Result<bool> {
        let name = match self.validate(name) {
            Ok(name) => name,
            Err(e) => {
                warn!(error = %e, "refusing to kill session");
                return Ok(false);
            }
        };
        let output = self.run("kill-session", kill_session_args(&name)).await?;
        if output.success {
            info!(session = %name, "killed tmux session");
        } else {
            debug!(session = %name, stderr = %output.stderr.trim(), "tmux kill-session failed");
        }
        Ok(output.success)
    }

    /// Type `text` into the session followed by Enter.
    ///
    /// No escaping is applied; callers constrain the content.
    pub async fn send_keys(&self, name: &str, text: &str) -> Result<()> {
        let name = self.validate(name)?;
        let output = self.run("send-keys", send_keys_args(&name, text)).await?;
        if !output.success {
            return Err(provisioning("send-keys", output.stderr.trim()));
        }
        debug!(session = %name, bytes = text.len(), "sent keys");
        Ok(())
    }

    /// Visible contents of the session's active pane.
    pub async fn capture_pane(&self, name: &str) -> Result<String> {
        let name = self.validate(name)?;
        let output = self.run("capture-pane", capture_pane_args(&name)).await?;
        if !output.success {
            return Err(provisioning("capture-pane", output.stderr.trim()));
        }
        Ok(output.stdout)
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("prefix", &self.prefix)
            .field("geometry", &self.geometry)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTmux;

    fn registry(fake: &Arc<FakeTmux>) -> SessionRegistry {
        SessionRegistry::new(SessionPrefix::default(), fake.clone())
    }

    #[tokio::test]
    async fn list_filters_foreign_sessions() {
        let fake = Arc::new(FakeTmux::new());
        fake.add_session("mf-one", false);
        fake.add_session("mf-two", true);
        fake.add_session("work", true);
        fake.add_session("mfx-sneaky", false);

        let mut sessions = registry(&fake).list_sessions().await.unwrap();
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        assert_eq!(
            sessions,
            vec![
                SessionInfo { name: "mf-one".into(), attached: false },
                SessionInfo { name: "mf-two".into(), attached: true },
            ]
        );
    }

    #[tokio::test]
    async fn list_with_no_server_is_empty() {
        let fake = Arc::new(FakeTmux::new());
        let sessions = registry(&fake).list_sessions().await.unwrap();
        assert!(sessions.is_empty());
        assert_eq!(fake.calls().len(), 1);
    }

    #[tokio::test]
    async fn list_with_missing_binary_is_provisioning_error() {
        let fake = Arc::new(FakeTmux::new());
        fake.set_unavailable(true);
        let err = registry(&fake).list_sessions().await.unwrap_err();
        assert!(matches!(err, RegistryError::Provisioning { op: "list-sessions", .. }));
    }

    #[tokio::test]
    async fn kill_invalid_name_never_runs_tmux() {
        let fake = Arc::new(FakeTmux::new());
        fake.add_session("work", false);
        let reg = registry(&fake);

        for bad in ["work", "", "mf-", "mf-a b", "mf-x;tmux kill-server", "-t", "=mf-a"] {
            assert!(!reg.kill_session(bad).await.unwrap(), "{bad:?}");
        }
        assert!(fake.calls().is_empty());
        assert!(fake.has_session("work"));
    }

    #[tokio::test]
    async fn kill_existing_and_missing() {
        let fake = Arc::new(FakeTmux::new());
        fake.add_session("mf-abc", false);
        let reg = registry(&fake);

        assert!(reg.kill_session("mf-abc").await.unwrap());
        assert!(!fake.has_session("mf-abc"));
        assert!(!reg.kill_session("mf-abc").await.unwrap());
        assert_eq!(fake.calls()[0], ["kill-session", "-t", "=mf-abc"]);
    }

    #[tokio::test]
    async fn create_uses_configured_geometry() {
        let fake = Arc::new(FakeTmux::new());
        let reg = registry(&fake).with_geometry(TermSize::new(132, 43));

        let name = reg.create_session("mf-new").await.unwrap();
        assert_eq!(name.as_str(), "mf-new");
        assert!(fake.has_session("mf-new"));
        assert_eq!(
            fake.calls()[0],
            ["new-session", "-d", "-s", "mf-new", "-x", "132", "-y", "43"]
        );
    }

    #[tokio::test]
    async fn create_rejects_foreign_name() {
        let fake = Arc::new(FakeTmux::new());
        let err = registry(&fake).create_session("work").await.unwrap_err();
        assert!(matches!(err, RegistryError::Validation(_)));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn create_duplicate_is_provisioning_error() {
        let fake = Arc::new(FakeTmux::new());
        fake.add_session("mf-dup", false);
        let err = registry(&fake).create_session("mf-dup").await.unwrap_err();
        assert!(matches!(err, RegistryError::Provisioning { op: "new-session", .. }));
    }

    #[tokio::test]
    async fn send_keys_records_text() {
        let fake = Arc::new(FakeTmux::new());
        fake.add_session("mf-abc", false);
        registry(&fake).send_keys("mf-abc", "echo hi").await.unwrap();
        assert_eq!(fake.keys("mf-abc"), vec!["echo hi".to_string()]);
    }

    #[tokio::test]
    async fn send_keys_to_missing_session_fails() {
        let fake = Arc::new(FakeTmux::new());
        let err = registry(&fake).send_keys("mf-gone", "x").await.unwrap_err();
        assert!(matches!(err, RegistryError::Provisioning { op: "send-keys", .. }));
    }
}
