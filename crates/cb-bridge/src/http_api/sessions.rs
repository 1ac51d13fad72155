use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use cb_core::types::{DelegateRequest, DelegateResponse, SessionInfo};
use std::sync::Arc;
use tracing::info;

use super::state::ApiState;
use crate::api_error::ApiError;

/// GET /api/tmux/sessions -- sessions carrying the reserved prefix.
pub(crate) async fn list_sessions(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<Vec<SessionInfo>>, ApiError> {
    Ok(Json(state.registry.list_sessions().await?))
}

/// DELETE /api/tmux/sessions/{name} -- kill one owned session.
///
/// A name that is not ours is reported the same as a missing session.
pub(crate) async fn kill_session(
    State(state): State<Arc<ApiState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    if state.registry.kill_session(&name).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Session not found".into()))
    }
}

/// POST /api/tmux/delegate -- provision a session and hand the task to an
/// agent running in it.
pub(crate) async fn delegate(
    State(state): State<Arc<ApiState>>,
    body: Result<Json<DelegateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<DelegateResponse>), ApiError> {
    let Json(req) = body?;
    if req.prompt.trim().is_empty() {
        return Err(ApiError::BadRequest("prompt must not be empty".into()));
    }

    let session = state.delegator.delegate(&req.task_id, &req.prompt).await?;
    info!(task_id = %req.task_id, session = %session, "delegation accepted");

    Ok((
        StatusCode::CREATED,
        Json(DelegateResponse {
            task_id: req.task_id,
            session_name: session.into_string(),
        }),
    ))
}
