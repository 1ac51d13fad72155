//! tmux session lifecycle for the cerebro bridge.
//!
//! - [`registry`]: validated list/create/kill/send-keys over the tmux CLI
//! - [`delegation`]: provision a session for a task and hand it to an agent
//! - [`pty`]: pseudo-terminal handles and the attacher used by the relay
//! - [`reaper`]: kill every owned session at shutdown
//! - [`tmux`]: the command runner seam and argument builders

pub mod delegation;
pub mod pty;
pub mod reaper;
pub mod registry;
pub mod tmux;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;
