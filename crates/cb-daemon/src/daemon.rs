use std::sync::Arc;

use anyhow::{Context, Result};
use cb_bridge::http_api::{api_router, ApiState};
use cb_core::config::Config;
use cb_session::reaper::{reap_owned_sessions, ReapReport};
use tracing::info;

use crate::shutdown::ShutdownSignal;

/// Environment variable that overrides `[daemon] port`.
pub const PORT_ENV: &str = "CEREBRO_PORT";

/// Apply environment overrides on top of the file configuration.
///
/// `lookup` is `std::env::var(..).ok()` in production.
pub fn apply_env_overrides(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup(PORT_ENV) {
        config.daemon.port = raw
            .trim()
            .parse()
            .with_context(|| format!("{PORT_ENV}={raw:?} is not a valid port"))?;
    }
    Ok(())
}

/// The cerebro daemon.
///
/// Serves the bridge API until the [`ShutdownSignal`] fires, then stops
/// accepting connections and kills every tmux session carrying the
/// reserved prefix.
pub struct Daemon {
    config: Config,
    api_state: Arc<ApiState>,
    shutdown: ShutdownSignal,
}

impl Daemon {
    /// Build a daemon wired to the real tmux binary.
    pub fn new(config: Config) -> Result<Self> {
        let api_state = ApiState::from_config(&config).context("invalid bridge configuration")?;
        Ok(Self::with_state(config, Arc::new(api_state)))
    }

    /// Build a daemon around an existing state (tests inject fakes here).
    pub fn with_state(config: Config, api_state: Arc<ApiState>) -> Self {
        Self {
            config,
            api_state,
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Returns a handle that can be used to trigger shutdown from another task.
    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn api_state(&self) -> &Arc<ApiState> {
        &self.api_state
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Serve on a pre-bound listener until shutdown, then reap.
    pub async fn run_with_listener(&self, listener: tokio::net::TcpListener) -> Result<ReapReport> {
        let bind_addr = listener.local_addr()?;
        let router = api_router(self.api_state.clone());
        let shutdown = self.shutdown.clone();

        info!(%bind_addr, prefix = %self.api_state.registry.prefix(), "API server listening");
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.wait().await })
            .await
            .context("API server error")?;
        info!("API server stopped");

        let report = reap_owned_sessions(&self.api_state.registry).await;
        info!("daemon stopped");
        Ok(report)
    }

    /// Bind to `[daemon] host:port` and run until shutdown.
    pub async fn run(&self) -> Result<ReapReport> {
        let bind_addr = self.config.daemon.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr)
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        self.run_with_listener(listener).await
    }
}
