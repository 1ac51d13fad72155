mod commands;

use anyhow::Context;
use cb_core::config::Config;
use clap::{Parser, Subcommand};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// cb -- manage the tmux sessions behind a running cerebro daemon.
#[derive(Parser)]
#[command(name = "cb", version, about)]
struct Cli {
    /// Daemon base URL. Defaults to `[daemon] host:port` from
    /// ~/.cerebro/config.toml.
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// List sessions owned by cerebro (default when no subcommand is given).
    Sessions,

    /// Kill an owned session by name.
    Kill {
        /// Full session name, e.g. mf-task-123.
        name: String,
    },

    /// Start an agent on a task in a fresh session.
    Delegate {
        /// Task identifier; its first 8 characters name the session.
        task_id: String,
        /// Prompt typed into the agent once it is up.
        prompt: String,
    },
}

fn default_api_url() -> anyhow::Result<String> {
    let config = Config::load().context("failed to load cerebro config")?;
    Ok(format!("http://{}", config.daemon.bind_addr()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let api_url = match cli.api_url {
        Some(url) => url.trim_end_matches('/').to_string(),
        None => default_api_url()?,
    };

    match cli.command {
        None | Some(Commands::Sessions) => commands::sessions::run(&api_url).await?,
        Some(Commands::Kill { name }) => commands::kill::run(&api_url, &name).await?,
        Some(Commands::Delegate { task_id, prompt }) => {
            commands::delegate::run(&api_url, &task_id, &prompt).await?
        }
    }

    Ok(())
}
