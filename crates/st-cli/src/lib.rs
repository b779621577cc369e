//! Sleep tracker CLI library.
//!
//! Hosts the runtime pieces that sit above storage: the live activity
//! tracker, the recompute scheduler, the enqueuer, and the upload
//! processor, plus the daemon and commands that wire them together.

pub mod app;
pub mod blocking;
mod cli;
pub mod commands;
mod config;
pub mod daemon;
pub mod device;
pub mod enqueue;
pub mod idle;
pub mod processor;
pub mod recompute;
pub mod tracker;

pub use app::App;
pub use cli::{Cli, Commands, QueueAction};
pub use config::Config;
