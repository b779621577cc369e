//! CLI subcommand implementations.

pub mod init;
pub mod queue;
pub mod recompute;
pub mod send_now;
pub mod status;
