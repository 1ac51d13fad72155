// ---------------------------------------------------------------------------
// HTTP API module directory
// ---------------------------------------------------------------------------
//
// `state` owns the shared handles, `sessions` the tmux endpoints, `misc`
// the health probe. This file wires them into the axum router.

mod misc;
mod sessions;
pub mod state;

pub use state::ApiState;

pub use self::router::api_router;

// ---------------------------------------------------------------------------
// Router + middleware
// ---------------------------------------------------------------------------

mod router {
    use super::*;
    use axum::{
        middleware as axum_middleware,
        routing::{delete, get, post},
        Router,
    };
    use std::sync::Arc;
    use tower_http::cors::CorsLayer;

    use crate::terminal_ws;
    use cb_telemetry::tracing_setup::request_id_middleware;

    /// Build the full router: REST endpoints under `/api` plus the terminal
    /// websocket at `/ws/terminal`.
    pub fn api_router(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/api/health", get(misc::health))
            .route("/api/tmux/sessions", get(sessions::list_sessions))
            .route("/api/tmux/sessions/{name}", delete(sessions::kill_session))
            .route("/api/tmux/delegate", post(sessions::delegate))
            .route("/ws/terminal", get(terminal_ws::terminal_ws))
            .layer(axum_middleware::from_fn(request_id_middleware))
            .layer(CorsLayer::very_permissive())
            .with_state(state)
    }
}
