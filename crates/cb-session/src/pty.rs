use std::io::{Read as IoRead, Write as IoWrite};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use cb_core::session_name::SessionName;
use portable_pty::{native_pty_system, CommandBuilder, PtySize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tmux::attach_session_args;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PtyError {
    #[error("pty spawn failed: {0}")]
    SpawnFailed(String),

    #[error("pty I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pty internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, PtyError>;

// ---------------------------------------------------------------------------
// TermSize
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl TermSize {
    pub const fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self::new(200, 50)
    }
}

impl From<TermSize> for PtySize {
    fn from(size: TermSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// PtyIo
// ---------------------------------------------------------------------------

/// A live pseudo-terminal as seen by a relay: a byte stream out, a byte
/// stream in, and the two control operations.
///
/// The output receiver disconnects once the child process has exited and
/// all of its output has been delivered.
pub trait PtyIo: Send + Sync {
    fn output(&self) -> flume::Receiver<Vec<u8>>;
    fn input(&self) -> flume::Sender<Vec<u8>>;
    fn resize(&self, size: TermSize) -> Result<()>;
    /// Signal the child to terminate.
    fn kill(&self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// PtyCommand
// ---------------------------------------------------------------------------

/// What to run inside a new pty.
#[derive(Debug, Clone)]
pub struct PtyCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
    pub cwd: Option<PathBuf>,
    pub size: TermSize,
}

impl PtyCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            size: TermSize::default(),
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn size(mut self, size: TermSize) -> Self {
        self.size = size;
        self
    }
}

// ---------------------------------------------------------------------------
// PtyHandle
// ---------------------------------------------------------------------------

/// A handle to a single pty child with async read/write channels.
///
/// Output is pumped by a dedicated reader thread and input by a writer
/// thread, since the portable-pty handles are blocking.
pub struct PtyHandle {
    reader: flume::Receiver<Vec<u8>>,
    writer: flume::Sender<Vec<u8>>,
    child: Arc<Mutex<Box<dyn portable_pty::Child + Send + Sync>>>,
    master: Arc<Mutex<Box<dyn portable_pty::MasterPty + Send>>>,
}

impl PtyHandle {
    /// Spawn `cmd` inside a fresh pty.
    pub fn spawn(cmd: &PtyCommand) -> Result<Self> {
        let pty_system = native_pty_system();

        let pair = pty_system
            .openpty(cmd.size.into())
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;

        let mut command = CommandBuilder::new(&cmd.program);
        command.args(&cmd.args);
        for (k, v) in &cmd.env {
            command.env(k, v);
        }
        if let Some(cwd) = &cmd.cwd {
            command.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        // Only the child keeps the slave open, so EOF on the master tracks
        // the child's exit.
        drop(pair.slave);

        debug!(program = %cmd.program, args = ?cmd.args, "spawned pty process");

        // -- output reader thread --
        let (read_tx, read_rx) = flume::bounded::<Vec<u8>>(256);
        let mut reader = pair
            .master
            .try_clone_reader()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        std::thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if read_tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Linux reports EIO once the child side has closed.
                        debug!("pty reader finished: {e}");
                        break;
                    }
                }
            }
        });

        // -- input writer thread --
        let (write_tx, write_rx) = flume::bounded::<Vec<u8>>(256);
        let mut writer = pair
            .master
            .take_writer()
            .map_err(|e| PtyError::SpawnFailed(e.to_string()))?;
        std::thread::spawn(move || {
            while let Ok(data) = write_rx.recv() {
                if writer.write_all(&data).is_err() {
                    break;
                }
                let _ = writer.flush();
            }
        });

        Ok(Self {
            reader: read_rx,
            writer: write_tx,
            child: Arc::new(Mutex::new(child)),
            master: Arc::new(Mutex::new(pair.master)),
        })
    }

    /// Check whether the child process is still running.
    pub fn is_alive(&self) -> bool {
        let mut child = self.child.lock().unwrap_or_else(|e| {
            warn!("child lock was poisoned, recovering");
            e.into_inner()
        });
        matches!(child.try_wait(), Ok(None))
    }

    /// Current pty geometry as reported by the master side.
    pub fn size(&self) -> Result<TermSize> {
        let master = self.master.lock().unwrap_or_else(|e| {
            warn!("master lock was poisoned, recovering");
            e.into_inner()
        });
        let size = master
            .get_size()
            .map_err(|e| PtyError::Internal(format!("get_size failed: {e}")))?;
        Ok(TermSize::new(size.cols, size.rows))
    }
}

impl PtyIo for PtyHandle {
    fn output(&self) -> flume::Receiver<Vec<u8>> {
        self.reader.clone()
    }

    fn input(&self) -> flume::Sender<Vec<u8>> {
        self.writer.clone()
    }

    fn resize(&self, size: TermSize) -> Result<()> {
        let master = self.master.lock().unwrap_or_else(|e| {
            warn!("master lock was poisoned, recovering");
            e.into_inner()
        });
        master
            .resize(size.into())
            .map_err(|e| PtyError::Internal(format!("resize failed: {e}")))?;
        debug!(cols = size.cols, rows = size.rows, "pty resized");
        Ok(())
    }

    fn kill(&self) -> Result<()> {
        let mut child = self.child.lock().unwrap_or_else(|e| {
            warn!("child lock was poisoned, recovering");
            e.into_inner()
        });
        if !matches!(child.try_wait(), Ok(None)) {
            return Ok(());
        }
        child.kill()?;
        Ok(())
    }
}

impl std::fmt::Debug for PtyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyHandle")
            .field("alive", &self.is_alive())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// SessionAttacher
// ---------------------------------------------------------------------------

/// Opens a pty attached to an existing session.
pub trait SessionAttacher: Send + Sync {
    fn attach(&self, session: &SessionName, size: TermSize) -> Result<Box<dyn PtyIo>>;
}

/// Attaches by running `tmux attach-session -t =<name>` inside a pty.
#[derive(Debug, Clone)]
pub struct TmuxAttacher {
    binary: String,
    cwd: PathBuf,
}

impl TmuxAttacher {
    /// `cwd` defaults to the user's home directory, or `/`.
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            cwd: dirs::home_dir().unwrap_or_else(|| PathBuf::from("/")),
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = cwd.into();
        self
    }

    pub fn command(&self, session: &SessionName, size: TermSize) -> PtyCommand {
        PtyCommand::new(&self.binary)
            .args(attach_session_args(session))
            .env("TERM", "xterm-256color")
            .cwd(&self.cwd)
            .size(size)
    }
}

impl SessionAttacher for TmuxAttacher {
    fn attach(&self, session: &SessionName, size: TermSize) -> Result<Box<dyn PtyIo>> {
        let handle = PtyHandle::spawn(&self.command(session, size))?;
        info!(session = %session, cols = size.cols, rows = size.rows, "attached pty to session");
        Ok(Box::new(handle))
    }
}
