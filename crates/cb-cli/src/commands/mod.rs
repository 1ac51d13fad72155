use std::time::Duration;

use anyhow::Context;

pub mod delegate;
pub mod kill;
pub mod sessions;

/// Covers a delegation waiting out the agent's readiness timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Build the reqwest client used for every daemon call.
pub fn api_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .context("failed to build HTTP client")
}

/// `api_url` with `segments` appended, each percent-encoded.
pub fn endpoint(api_url: &str, segments: &[&str]) -> anyhow::Result<reqwest::Url> {
    let mut url =
        reqwest::Url::parse(api_url).with_context(|| format!("invalid API URL {api_url:?}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("API URL {api_url:?} cannot take a path"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map common reqwest errors to user-friendly messages.
pub fn friendly_error(err: reqwest::Error) -> anyhow::Error {
    if err.is_connect() {
        anyhow::anyhow!(
            "Could not connect to the cerebro daemon. Is it running?\n  \
             (hint: start it with `cerebro` or check --api-url)"
        )
    } else if err.is_timeout() {
        anyhow::anyhow!("Request timed out. tmux may be hung.")
    } else {
        anyhow::anyhow!("API request failed: {err}")
    }
}

/// Pull the `error` field out of a failed response, falling back to the
/// status line.
pub async fn error_message(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<serde_json::Value>().await {
        Ok(body) => body["error"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP {status}")),
        Err(_) => format!("HTTP {status}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_segments() {
        let url = endpoint("http://127.0.0.1:3001", &["api", "tmux", "sessions", "a?b/c"]).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3001/api/tmux/sessions/a%3Fb%2Fc");

        let url = endpoint("http://localhost:3001/", &["api", "health"]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:3001/api/health");
    }

    #[test]
    fn endpoint_rejects_garbage() {
        assert!(endpoint("not a url", &["api"]).is_err());
    }
}
