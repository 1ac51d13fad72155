//! Observability setup shared by the cerebro binaries.
//!
//! - **Logging**: human-readable or JSON output via `tracing-subscriber`
//! - **Request tracing**: an Axum middleware that tags every request with an
//!   `x-request-id` and runs it inside an `http_request` span

pub mod logging;
pub mod tracing_setup;
