use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use st_cli::app::local_now;
use st_cli::commands::{init, queue, recompute, send_now, status};
use st_cli::{App, Cli, Commands, Config, QueueAction, daemon};

fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");
    Ok(config)
}

/// Load config and open the data directory.
fn open_app(config_path: Option<&Path>) -> Result<App> {
    App::open(load_config(config_path)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // try_init so tests that already installed a subscriber don't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let config_path = cli.config.as_deref();
    let mut stdout = std::io::stdout();

    match &cli.command {
        Some(Commands::Init { label }) => {
            let config = load_config(config_path)?;
            init::run(&mut stdout, &config.data_dir, label.as_deref())?;
        }
        Some(Commands::Run) => {
            daemon::run(open_app(config_path)?).await?;
        }
        Some(Commands::Status { json }) => {
            status::run(&mut stdout, &open_app(config_path)?, *json)?;
        }
        Some(Commands::Recompute) => {
            recompute::run(&mut stdout, &open_app(config_path)?, local_now())?;
        }
        Some(Commands::SendNow) => {
            send_now::run(&mut stdout, &open_app(config_path)?, local_now()).await?;
        }
        Some(Commands::Queue(action)) => {
            let app = open_app(config_path)?;
            match action {
                QueueAction::List => queue::list(&mut stdout, &app)?,
                QueueAction::Purge { days } => queue::purge(&mut stdout, &app, *days, Utc::now())?,
                QueueAction::Flush => queue::flush(&mut stdout, &app).await?,
            }
        }
        None => {
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
