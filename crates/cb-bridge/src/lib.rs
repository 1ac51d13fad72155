//! HTTP and websocket surface of the cerebro session bridge.
//!
//! - [`http_api`]: axum router, shared state, REST handlers
//! - [`terminal_ws`]: `/ws/terminal` routing and the per-connection relay
//! - [`protocol`]: client frame decoding and output chunking
//! - [`api_error`]: JSON error responses

pub mod api_error;
pub mod http_api;
pub mod protocol;
pub mod terminal_ws;
