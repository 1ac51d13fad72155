use std::process::Stdio;

use async_trait::async_trait;
use cb_core::session_name::SessionName;
use tracing::debug;

use crate::pty::TermSize;

/// Format string for `list-sessions`: one `name<TAB>attached-count` per line.
pub const LIST_FORMAT: &str = "#{session_name}\t#{session_attached}";

// ---------------------------------------------------------------------------
// TmuxRunner trait (for testability)
// ---------------------------------------------------------------------------

/// Captured result of one tmux invocation.
#[derive(Debug, Clone, Default)]
pub struct TmuxOutput {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
}

impl TmuxOutput {
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Abstraction over the tmux command line so it can be faked in tests.
///
/// `Err` means tmux could not be started at all (binary missing, fork
/// failure). A tmux that ran and exited non-zero is `Ok` with
/// `success == false`.
#[async_trait]
pub trait TmuxRunner: Send + Sync {
    async fn run(&self, args: &[String]) -> std::io::Result<TmuxOutput>;

    /// Program name used for pty attachments.
    fn binary(&self) -> &str;
}

/// Real runner that shells out to the tmux binary.
#[derive(Debug, Clone)]
pub struct CliTmuxRunner {
    binary: String,
}

impl CliTmuxRunner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for CliTmuxRunner {
    fn default() -> Self {
        Self::new("tmux")
    }
}

#[async_trait]
impl TmuxRunner for CliTmuxRunner {
    async fn run(&self, args: &[String]) -> std::io::Result<TmuxOutput> {
        debug!(binary = %self.binary, ?args, "running tmux");
        let output = tokio::process::Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        Ok(TmuxOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    fn binary(&self) -> &str {
        &self.binary
    }
}

// ---------------------------------------------------------------------------
// Argument builders
// ---------------------------------------------------------------------------
//
// Every builder that targets a session takes a `SessionName`, so an
// unvalidated string cannot reach the command line. Targets use `=` so tmux
// matches the name exactly instead of falling back to a prefix match.

/// Exact session target, `=name`.
fn session_target(name: &SessionName) -> String {
    format!("={name}")
}

/// Active pane of the exactly-named session, `=name:`.
fn pane_target(name: &SessionName) -> String {
    format!("={name}:")
}

pub fn list_sessions_args() -> Vec<String> {
    vec!["list-sessions".into(), "-F".into(), LIST_FORMAT.into()]
}

pub fn new_session_args(name: &SessionName, size: TermSize) -> Vec<String> {
    vec![
        "new-session".into(),
        "-d".into(),
        "-s".into(),
        name.to_string(),
        "-x".into(),
        size.cols.to_string(),
        "-y".into(),
        size.rows.to_string(),
    ]
}

pub fn kill_session_args(name: &SessionName) -> Vec<String> {
    vec!["kill-session".into(), "-t".into(), session_target(name)]
}

/// `--` stops option parsing so text starting with `-` is sent as keys.
pub fn send_keys_args(name: &SessionName, text: &str) -> Vec<String> {
    vec![
        "send-keys".into(),
        "-t".into(),
        pane_target(name),
        "--".into(),
        text.into(),
        "Enter".into(),
    ]
}

pub fn capture_pane_args(name: &SessionName) -> Vec<String> {
    vec![
        "capture-pane".into(),
        "-p".into(),
        "-t".into(),
        pane_target(name),
    ]
}

pub fn attach_session_args(name: &SessionName) -> Vec<String> {
    vec!["attach-session".into(), "-t".into(), session_target(name)]
}

/// Parse `list-sessions` output in [`LIST_FORMAT`] into `(name, attached)`.
///
/// Blank or malformed lines are skipped.
pub fn parse_session_lines(stdout: &str) -> Vec<(String, bool)> {
    stdout
        .lines()
        .filter_map(|line| {
            let line = line.trim_end_matches('\r');
            let (name, attached) = line.split_once('\t')?;
            if name.is_empty() {
                return None;
            }
            let attached = attached.trim().parse::<u32>().map(|n| n > 0).unwrap_or(false);
            Some((name.to_string(), attached))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use cb_core::session_name::SessionPrefix;

    fn name(raw: &str) -> SessionName {
        SessionPrefix::default().parse(raw).unwrap()
    }

    #[test]
    fn new_session_uses_detached_fixed_geometry() {
        let args = new_session_args(&name("mf-abc"), TermSize::new(200, 50));
        assert_eq!(
            args,
            ["new-session", "-d", "-s", "mf-abc", "-x", "200", "-y", "50"]
        );
    }

    #[test]
    fn kill_targets_exact_name() {
        assert_eq!(
            kill_session_args(&name("mf-abc")),
            ["kill-session", "-t", "=mf-abc"]
        );
    }

    #[test]
    fn targets_never_match_by_prefix() {
        let n = name("mf-a");
        assert_eq!(attach_session_args(&n), ["attach-session", "-t", "=mf-a"]);
        assert_eq!(capture_pane_args(&n), ["capture-pane", "-p", "-t", "=mf-a:"]);
        assert_eq!(send_keys_args(&n, "x")[2], "=mf-a:");
    }

    #[test]
    fn send_keys_appends_enter() {
        let args = send_keys_args(&name("mf-abc"), "-rf is not a flag");
        assert_eq!(
            args,
            ["send-keys", "-t", "=mf-abc:", "--", "-rf is not a flag", "Enter"]
        );
    }

    #[test]
    fn parses_list_output() {
        let out = "mf-one\t0\nmf-two\t1\nother\t2\n\ngarbage\nmf-three\tx\n";
        assert_eq!(
            parse_session_lines(out),
            vec![
                ("mf-one".to_string(), false),
                ("mf-two".to_string(), true),
                ("other".to_string(), true),
                ("mf-three".to_string(), false),
            ]
        );
    }

    #[tokio::test]
    async fn missing_binary_is_io_error() {
        let runner = CliTmuxRunner::new("/nonexistent/tmux-binary");
        let err = runner.run(&list_sessions_args()).await.unwrap_err();
        assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    }
}
