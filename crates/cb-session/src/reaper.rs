use tracing::{info, warn};

use crate::registry::SessionRegistry;

/// Outcome of one reaping pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReapReport {
    pub killed: Vec<String>,
    pub failed: Vec<String>,
}

impl ReapReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Kill every live session carrying the reserved prefix.
///
/// Kills run one at a time. A failed kill is logged and skipped; the pass
/// never aborts early. If the session list itself cannot be read, nothing
/// is killed.
pub async fn reap_owned_sessions(registry: &SessionRegistry) -> ReapReport {
    let mut report = ReapReport::default();

    let sessions = match registry.list_sessions().await {
        Ok(sessions) => sessions,
        Err(e) => {
            warn!(error = %e, "could not list sessions for reaping");
            return report;
        }
    };

    for session in sessions {
        match registry.kill_session(&session.name).await {
            Ok(true) => report.killed.push(session.name),
            Ok(false) => {
                warn!(session = %session.name, "tmux refused to kill session");
                report.failed.push(session.name);
            }
            Err(e) => {
                warn!(session = %session.name, error = %e, "failed to kill session");
                report.failed.push(session.name);
            }
        }
    }

    info!(
        killed = report.killed.len(),
        failed = report.failed.len(),
        "session reaping complete"
    );
    report
}
