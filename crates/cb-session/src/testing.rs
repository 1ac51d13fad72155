//! In-memory stand-ins for tmux and for pty attachments.
//!
//! Compiled for this crate's tests and, through the `test-util` feature, for
//! downstream crates' tests.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use cb_core::session_name::SessionName;

use crate::pty::{PtyError, PtyIo, Result as PtyResult, SessionAttacher, TermSize};
use crate::tmux::{TmuxOutput, TmuxRunner};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

// ---------------------------------------------------------------------------
// FakeTmux
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct FakeSession {
    attached: bool,
    keys: Vec<String>,
    pane: String,
}

#[derive(Debug, Default)]
struct FakeState {
    sessions: BTreeMap<String, FakeSession>,
    calls: Vec<Vec<String>>,
    unavailable: bool,
    echoes: Vec<(String, String)>,
}

/// Simulates the subset of tmux the registry drives.
///
/// Sessions live in a map; `send-keys` appends to a per-session key log;
/// `capture-pane` returns the session's pane text.
#[derive(Debug, Default)]
pub struct FakeTmux {
    state: Mutex<FakeState>,
}

impl FakeTmux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_session(&self, name: &str, attached: bool) {
        lock(&self.state).sessions.insert(
            name.to_string(),
            FakeSession {
                attached,
                ..FakeSession::default()
            },
        );
    }

    pub fn has_session(&self, name: &str) -> bool {
        lock(&self.state).sessions.contains_key(name)
    }

    pub fn session_names(&self) -> Vec<String> {
        lock(&self.state).sessions.keys().cloned().collect()
    }

    pub fn set_attached(&self, name: &str, attached: bool) {
        if let Some(s) = lock(&self.state).sessions.get_mut(name) {
            s.attached = attached;
        }
    }

    /// Keys sent to `name`, in order.
    pub fn keys(&self, name: &str) -> Vec<String> {
        lock(&self.state)
            .sessions
            .get(name)
            .map(|s| s.keys.clone())
            .unwrap_or_default()
    }

    /// Every invocation's argument list, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        lock(&self.state).calls.clone()
    }

    /// Make every invocation fail as if the binary were missing.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    /// When `keys` are sent to a session, append `output` to its pane.
    pub fn echo_on(&self, keys: &str, output: &str) {
        lock(&self.state)
            .echoes
            .push((keys.to_string(), output.to_string()));
    }

    fn target(args: &[String]) -> Option<String> {
        let pos = args.iter().position(|a| a == "-t" || a == "-s")?;
        let raw = args.get(pos + 1)?;
        let raw = raw.strip_prefix('=').unwrap_or(raw);
        Some(raw.strip_suffix(':').unwrap_or(raw).to_string())
    }
}

#[async_trait]
impl TmuxRunner for FakeTmux {
    async fn run(&self, args: &[String]) -> std::io::Result<TmuxOutput> {
        let mut state = lock(&self.state);
        state.calls.push(args.to_vec());
        if state.unavailable {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "tmux: command not found",
            ));
        }

        let target = Self::target(args);
        let out = match args.first().map(String::as_str) {
            Some("list-sessions") => {
                if state.sessions.is_empty() {
                    TmuxOutput::failed("no server running on /tmp/tmux-0/default")
                } else {
                    let stdout: String = state
                        .sessions
                        .iter()
                        .map(|(name, s)| format!("{name}\t{}\n", u8::from(s.attached)))
                        .collect();
                    TmuxOutput::ok(stdout)
                }
            }
            Some("new-session") => match target {
                Some(name) if state.sessions.contains_key(&name) => {
                    TmuxOutput::failed(format!("duplicate session: {name}"))
                }
                Some(name) => {
                    state.sessions.insert(name, FakeSession::default());
                    TmuxOutput::ok("")
                }
                None => TmuxOutput::failed("usage: new-session"),
            },
            Some("kill-session") => match target {
                Some(name) if state.sessions.remove(&name).is_some() => TmuxOutput::ok(""),
                Some(name) => TmuxOutput::failed(format!("can't find session: {name}")),
                None => TmuxOutput::failed("usage: kill-session"),
            },
            Some("send-keys") => {
                let text = args.iter().skip_while(|a| *a != "--").nth(1).cloned();
                let echo = text.as_ref().and_then(|t| {
                    state
                        .echoes
                        .iter()
                        .find(|(k, _)| k == t)
                        .map(|(_, o)| o.clone())
                });
                match (target.and_then(|n| state.sessions.get_mut(&n)), text) {
                    (Some(session), Some(text)) => {
                        session.keys.push(text);
                        if let Some(echo) = echo {
                            session.pane.push_str(&echo);
                        }
                        TmuxOutput::ok("")
                    }
                    _ => TmuxOutput::failed("can't find pane"),
                }
            }
            Some("capture-pane") => match target.and_then(|n| state.sessions.get(&n)) {
                Some(session) => TmuxOutput::ok(session.pane.clone()),
                None => TmuxOutput::failed("can't find pane"),
            },
            _ => TmuxOutput::failed("unknown command"),
        };
        Ok(out)
    }

    fn binary(&self) -> &str {
        "tmux"
    }
}

// ---------------------------------------------------------------------------
// FakeAttacher
// ---------------------------------------------------------------------------

/// Test-side view of one fake pty.
#[derive(Debug)]
pub struct FakePtyProbe {
    pub session: String,
    pub size: TermSize,
    /// Push "process output". Drop to simulate the process exiting.
    pub output_tx: Option<flume::Sender<Vec<u8>>>,
    /// Everything written to the process.
    pub input_rx: flume::Receiver<Vec<u8>>,
    pub resizes: Arc<Mutex<Vec<TermSize>>>,
    pub killed: Arc<AtomicBool>,
}

impl FakePtyProbe {
    pub fn emit(&self, data: &[u8]) {
        if let Some(tx) = &self.output_tx {
            let _ = tx.send(data.to_vec());
        }
    }

    /// Simulate the attached process exiting.
    pub fn exit(&mut self) {
        self.output_tx = None;
    }

    pub fn resizes(&self) -> Vec<TermSize> {
        lock(&self.resizes).clone()
    }

    pub fn is_killed(&self) -> bool {
        self.killed.load(Ordering::SeqCst)
    }
}

struct FakePty {
    output: flume::Receiver<Vec<u8>>,
    input: flume::Sender<Vec<u8>>,
    resizes: Arc<Mutex<Vec<TermSize>>>,
    killed: Arc<AtomicBool>,
}

impl PtyIo for FakePty {
    fn output(&self) -> flume::Receiver<Vec<u8>> {
        self.output.clone()
    }

    fn input(&self) -> flume::Sender<Vec<u8>> {
        self.input.clone()
    }

    fn resize(&self, size: TermSize) -> PtyResult<()> {
        lock(&self.resizes).push(size);
        Ok(())
    }

    fn kill(&self) -> PtyResult<()> {
        self.killed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out fake ptys and reports each one to the test via a channel.
pub struct FakeAttacher {
    probes: flume::Sender<FakePtyProbe>,
    attaches: AtomicUsize,
    fail: AtomicBool,
    input_capacity: AtomicUsize,
}

impl FakeAttacher {
    pub fn new() -> (Self, flume::Receiver<FakePtyProbe>) {
        let (tx, rx) = flume::unbounded();
        (
            Self {
                probes: tx,
                attaches: AtomicUsize::new(0),
                fail: AtomicBool::new(false),
                input_capacity: AtomicUsize::new(0),
            },
            rx,
        )
    }

    /// Make subsequent attaches fail like a vanished session.
    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Bound the input channel of later ptys to `capacity` chunks, like a
    /// child that has stopped reading stdin. 0 means unbounded.
    pub fn set_input_capacity(&self, capacity: usize) {
        self.input_capacity.store(capacity, Ordering::SeqCst);
    }

    /// Number of attach attempts, successful or not.
    pub fn attach_count(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }
}

impl SessionAttacher for FakeAttacher {
    fn attach(&self, session: &SessionName, size: TermSize) -> PtyResult<Box<dyn PtyIo>> {
        self.attaches.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PtyError::SpawnFailed(format!(
                "can't find session: {session}"
            )));
        }

        let (output_tx, output_rx) = flume::unbounded();
        let (input_tx, input_rx) = match self.input_capacity.load(Ordering::SeqCst) {
            0 => flume::unbounded(),
            capacity => flume::bounded(capacity),
        };
        let resizes = Arc::new(Mutex::new(Vec::new()));
        let killed = Arc::new(AtomicBool::new(false));

        let _ = self.probes.send(FakePtyProbe {
            session: session.to_string(),
            size,
            output_tx: Some(output_tx),
            input_rx,
            resizes: resizes.clone(),
            killed: killed.clone(),
        });

        Ok(Box::new(FakePty {
            output: output_rx,
            input: input_tx,
            resizes,
            killed,
        }))
    }
}
