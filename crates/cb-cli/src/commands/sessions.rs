use cb_core::types::SessionInfo;

use super::{api_client, endpoint, error_message, friendly_error};

pub async fn fetch(api_url: &str) -> anyhow::Result<Vec<SessionInfo>> {
    let resp = api_client()?
        .get(endpoint(api_url, &["api", "tmux", "sessions"])?)
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        anyhow::bail!("Failed to list sessions: {}", error_message(resp).await);
    }
    resp.json().await.map_err(friendly_error)
}

pub fn render(sessions: &[SessionInfo]) -> String {
    if sessions.is_empty() {
        return "No cerebro sessions running.".to_string();
    }
    let width = sessions
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("NAME".len());

    let mut out = format!("{:<width$}  ATTACHED\n", "NAME");
    for s in sessions {
        let attached = if s.attached { "yes" } else { "no" };
        out.push_str(&format!("{:<width$}  {attached}\n", s.name));
    }
    out
}

/// Run the `sessions` subcommand.
pub async fn run(api_url: &str) -> anyhow::Result<()> {
    let mut sessions = fetch(api_url).await?;
    sessions.sort_by(|a, b| a.name.cmp(&b.name));
    println!("{}", render(&sessions).trim_end());
    Ok(())
}
