//! The cerebro daemon: serves the bridge API and cleans up owned tmux
//! sessions on the way out.

pub mod daemon;
pub mod shutdown;
