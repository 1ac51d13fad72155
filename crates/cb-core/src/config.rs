use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::session_name::{SessionPrefix, DEFAULT_SESSION_PREFIX};

/// Top-level configuration loaded from `~/.cerebro/config.toml`.
///
/// Every section is optional; missing keys fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub delegation: DelegationConfig,
}

impl Config {
    /// Load config from `~/.cerebro/config.toml`, falling back to defaults
    /// when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.bridge.validate()?;
        self.delegation.validate()?;
        Ok(())
    }

    /// `~/.cerebro`, or `./.cerebro` when no home directory is known.
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".cerebro")
    }

    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `human` or `json`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.trim() {
            "human" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format must be 'human' or 'json', got '{other}'"
            ))),
        }
    }

    pub fn json_logs(&self) -> bool {
        self.log_format.trim() == "json"
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "human".into()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_daemon_port")]
    pub port: u16,
    #[serde(default = "default_daemon_host")]
    pub host: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            port: default_daemon_port(),
            host: default_daemon_host(),
        }
    }
}

impl DaemonConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn default_daemon_port() -> u16 {
    3001
}
fn default_daemon_host() -> String {
    "127.0.0.1".into()
}

/// Settings for the tmux side of the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Reserved prefix for every session cerebro owns.
    #[serde(default = "default_session_prefix")]
    pub session_prefix: String,
    #[serde(default = "default_tmux_binary")]
    pub tmux_binary: String,
    /// Geometry for new sessions and fresh pty attachments.
    #[serde(default = "default_initial_cols")]
    pub initial_cols: u16,
    #[serde(default = "default_initial_rows")]
    pub initial_rows: u16,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            session_prefix: default_session_prefix(),
            tmux_binary: default_tmux_binary(),
            initial_cols: default_initial_cols(),
            initial_rows: default_initial_rows(),
        }
    }
}

impl BridgeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.prefix()?;
        if self.tmux_binary.trim().is_empty() {
            return Err(ConfigError::Validation(
                "bridge.tmux_binary must not be empty".to_string(),
            ));
        }
        if self.initial_cols == 0 || self.initial_rows == 0 {
            return Err(ConfigError::Validation(format!(
                "bridge.initial_cols/initial_rows must be non-zero, got {}x{}",
                self.initial_cols, self.initial_rows
            )));
        }
        Ok(())
    }

    /// The validated reserved prefix.
    pub fn prefix(&self) -> Result<SessionPrefix, ConfigError> {
        SessionPrefix::new(self.session_prefix.clone())
            .map_err(|e| ConfigError::Validation(format!("bridge.session_prefix: {e}")))
    }
}

fn default_session_prefix() -> String {
    DEFAULT_SESSION_PREFIX.into()
}
fn default_tmux_binary() -> String {
    "tmux".into()
}
fn default_initial_cols() -> u16 {
    200
}
fn default_initial_rows() -> u16 {
    50
}

/// Settings for launching an agent inside a freshly provisioned session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationConfig {
    /// Command typed into the session before the prompt.
    #[serde(default = "default_agent_command")]
    pub agent_command: String,
    /// Fixed wait between launching the agent and sending the prompt, used
    /// when no `ready_marker` is set.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
    #[serde(default = "default_prompt_max_chars")]
    pub prompt_max_chars: usize,
    /// Text the agent prints once it accepts input. When set, the pane is
    /// polled for it instead of sleeping `settle_ms`.
    #[serde(default)]
    pub ready_marker: Option<String>,
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
    #[serde(default = "default_ready_poll_ms")]
    pub ready_poll_ms: u64,
}

impl Default for DelegationConfig {
    fn default() -> Self {
        Self {
            agent_command: default_agent_command(),
            settle_ms: default_settle_ms(),
            prompt_max_chars: default_prompt_max_chars(),
            ready_marker: None,
            ready_timeout_ms: default_ready_timeout_ms(),
            ready_poll_ms: default_ready_poll_ms(),
        }
    }
}

impl DelegationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.agent_command.trim().is_empty() {
            return Err(ConfigError::Validation(
                "delegation.agent_command must not be empty".to_string(),
            ));
        }
        if self.prompt_max_chars == 0 {
            return Err(ConfigError::Validation(
                "delegation.prompt_max_chars must be greater than 0".to_string(),
            ));
        }
        if self.ready_marker.is_some() && self.ready_poll_ms == 0 {
            return Err(ConfigError::Validation(
                "delegation.ready_poll_ms must be greater than 0 when ready_marker is set"
                    .to_string(),
            ));
        }
        Ok(())
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    pub fn ready_poll(&self) -> Duration {
        Duration::from_millis(self.ready_poll_ms)
    }
}

fn default_agent_command() -> String {
    "claude".into()
}
fn default_settle_ms() -> u64 {
    2000
}
fn default_prompt_max_chars() -> usize {
    2000
}
fn default_ready_timeout_ms() -> u64 {
    30_000
}
fn default_ready_poll_ms() -> u64 {
    500
}
