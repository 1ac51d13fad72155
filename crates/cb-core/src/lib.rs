//! Shared building blocks for the cerebro session bridge.
//!
//! - [`config`]: `~/.cerebro/config.toml` loading and validation
//! - [`session_name`]: the reserved-prefix naming rule every tmux session
//!   owned by cerebro must satisfy
//! - [`types`]: wire types shared by the daemon and the CLI

pub mod config;
pub mod session_name;
pub mod types;
