//! cerebro daemon: serves the tmux session bridge until ctrl-c or SIGTERM,
//! then kills every session it owns.

use anyhow::{Context, Result};
use cb_core::config::Config;
use cb_daemon::daemon::{apply_env_overrides, Daemon};
use cb_daemon::shutdown::spawn_signal_listener;
use cb_telemetry::logging::{init_logging, LogFormat};
use tracing::{info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is normal.
    dotenv::dotenv().ok();

    let mut config = Config::load()
        .with_context(|| format!("failed to load {}", Config::default_path().display()))?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    init_logging(
        "cerebro",
        &config.general.log_level,
        LogFormat::from_json_flag(config.general.json_logs()),
    );
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = std::process::id(),
        "cerebro daemon starting"
    );

    let daemon = Daemon::new(config)?;
    spawn_signal_listener(daemon.shutdown_handle());

    let report = daemon.run().await?;
    if !report.is_clean() {
        warn!(failed = ?report.failed, "some owned sessions survived shutdown");
    }
    Ok(())
}
