use cb_core::types::{DelegateRequest, DelegateResponse, SessionInfo, TaskRef};

use super::{api_client, endpoint, error_message, friendly_error};

pub async fn send(api_url: &str, task_id: &str, prompt: &str) -> anyhow::Result<TaskRef> {
    let body = DelegateRequest {
        task_id: task_id.to_string(),
        prompt: prompt.to_string(),
    };
    let resp = api_client()?
        .post(endpoint(api_url, &["api", "tmux", "delegate"])?)
        .json(&body)
        .send()
        .await
        .map_err(friendly_error)?;

    if !resp.status().is_success() {
        anyhow::bail!("Delegation failed: {}", error_message(resp).await);
    }
    let resp: DelegateResponse = resp.json().await.map_err(friendly_error)?;
    Ok(resp.into())
}

/// Run the `delegate` subcommand.
pub async fn run(api_url: &str, task_id: &str, prompt: &str) -> anyhow::Result<()> {
    let task = send(api_url, task_id, prompt).await?;
    println!("{}", describe(&task, &super::sessions::fetch(api_url).await?));
    Ok(())
}

/// One-line status of a freshly delegated task.
pub fn describe(task: &TaskRef, live: &[SessionInfo]) -> String {
    match task.tmux_session.as_deref() {
        Some(session) if task.session_is_live(live) => format!(
            "task {} running in {session}\n  watch: tmux attach -t ={session}",
            task.task_id
        ),
        Some(session) => format!("task {}: session {session} has already exited", task.task_id),
        None => format!("task {} has no session", task.task_id),
    }
}

#[cfg(test)]
mod tests {
    use axum::{http::StatusCode, routing::post, Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::commands::test_support::serve;

    #[tokio::test]
    async fn posts_task_and_returns_session() {
        let app = Router::new().route(
            "/api/tmux/delegate",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["prompt"], "build the thing");
                (
                    StatusCode::CREATED,
                    Json(json!({"task_id": body["task_id"], "session_name": "mf-task-123"})),
                )
            }),
        );
        let base = serve(app).await;

        let task = send(&base, "task-1234abcd", "build the thing").await.unwrap();
        assert_eq!(task.task_id, "task-1234abcd");
        assert_eq!(task.tmux_session.as_deref(), Some("mf-task-123"));
    }

    #[tokio::test]
    async fn validation_error_is_surfaced() {
        let app = Router::new().route(
            "/api/tmux/delegate",
            post(|| async {
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({"error": "session suffix contains invalid characters"})),
                )
            }),
        );
        let base = serve(app).await;

        let err = send(&base, "a;b", "x").await.unwrap_err();
        assert!(err.to_string().contains("invalid characters"));
    }

    #[test]
    fn describe_checks_the_session_is_live() {
        let task = TaskRef {
            task_id: "task-1".into(),
            tmux_session: Some("mf-task-1".into()),
        };
        let live = [SessionInfo {
            name: "mf-task-1".into(),
            attached: false,
        }];
        assert!(describe(&task, &live).contains("tmux attach -t =mf-task-1"));
        assert_eq!(
            describe(&task, &[]),
            "task task-1: session mf-task-1 has already exited"
        );
    }
}
