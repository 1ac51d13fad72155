use reqwest::StatusCode;

use super::{api_client, endpoint, error_message, friendly_error};

/// Run the `kill` subcommand.
pub async fn run(api_url: &str, name: &str) -> anyhow::Result<()> {
    let resp = api_client()?
        .delete(endpoint(api_url, &["api", "tmux", "sessions", name])?)
        .send()
        .await
        .map_err(friendly_error)?;

    match resp.status() {
        StatusCode::NO_CONTENT => {
            println!("killed {name}");
            Ok(())
        }
        StatusCode::NOT_FOUND => {
            anyhow::bail!("No cerebro session named {name:?} (names start with the reserved prefix)")
        }
        _ => anyhow::bail!("Failed to kill {name}: {}", error_message(resp).await),
    }
}
