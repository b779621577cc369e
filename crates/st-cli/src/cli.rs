//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Idle-based sleep tracker.
///
/// Samples keyboard and mouse idle time, derives nightly sleep from long
/// inactivity inside a configured window, and ships one total per day to a
/// remote collector.
#[derive(Debug, Parser)]
#[command(name = "st", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create or show this device's identity.
    Init {
        /// Human-friendly label for this device (defaults to the hostname).
        #[arg(long)]
        label: Option<String>,
    },

    /// Run the tracker daemon until interrupted.
    Run,

    /// Show tracking status and recent nightly totals.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Recompute completed days from the sample log and queue changed totals.
    Recompute,

    /// Recompute yesterday now and try to deliver it immediately.
    SendNow,

    /// Inspect or manage the upload queue.
    #[command(subcommand)]
    Queue(QueueAction),
}

/// Upload queue actions.
#[derive(Debug, Subcommand)]
pub enum QueueAction {
    /// List pending uploads, oldest first.
    List,

    /// Delete pending uploads older than the retention period.
    Purge {
        /// Retention in days (defaults to `queue_retention_days`).
        #[arg(long)]
        days: Option<u32>,
    },

    /// Try to deliver every pending upload once.
    Flush,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_queue_purge() {
        let cli = Cli::try_parse_from(["st", "queue", "purge", "--days", "3"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Queue(QueueAction::Purge { days: Some(3) }))
        ));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["st", "status", "--json", "-v", "--config", "/tmp/st.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/st.toml")));
        assert!(matches!(cli.command, Some(Commands::Status { json: true })));
    }
}
