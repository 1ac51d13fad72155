use std::sync::Arc;
use std::time::Instant;

use cb_core::config::{Config, ConfigError};
use cb_session::delegation::Delegator;
use cb_session::pty::{SessionAttacher, TermSize, TmuxAttacher};
use cb_session::registry::SessionRegistry;
use cb_session::tmux::CliTmuxRunner;

/// Shared handles for every request and relay.
///
/// Nothing here is mutable: the registry and delegator drive tmux through
/// independent subprocess calls, and each relay owns its own pty.
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub delegator: Arc<Delegator>,
    pub attacher: Arc<dyn SessionAttacher>,
    /// Geometry of the pty each relay opens.
    pub initial_size: TermSize,
    pub start_time: Instant,
}

impl ApiState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        delegator: Arc<Delegator>,
        attacher: Arc<dyn SessionAttacher>,
    ) -> Self {
        Self {
            initial_size: registry.geometry(),
            registry,
            delegator,
            attacher,
            start_time: Instant::now(),
        }
    }

    /// Wire the real tmux runner and attacher from configuration.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let prefix = config.bridge.prefix()?;
        let geometry = TermSize::new(config.bridge.initial_cols, config.bridge.initial_rows);
        let runner = Arc::new(CliTmuxRunner::new(&config.bridge.tmux_binary));
        let registry = Arc::new(SessionRegistry::new(prefix, runner).with_geometry(geometry));
        let delegator = Arc::new(Delegator::new(registry.clone(), config.delegation.clone()));
        let attacher = Arc::new(TmuxAttacher::new(&config.bridge.tmux_binary));
        Ok(Self::new(registry, delegator, attacher))
    }

    pub fn with_initial_size(mut self, size: TermSize) -> Self {
        self.initial_size = size;
        self
    }
}

impl std::fmt::Debug for ApiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiState")
            .field("registry", &self.registry)
            .field("initial_size", &self.initial_size)
            .finish()
    }
}
