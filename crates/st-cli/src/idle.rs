//! OS idle-time queries.

use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// How long the idle command may run before the tick is skipped.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of "time since last user input".
pub trait IdleSource: Send + Sync {
    fn idle_time(&self) -> impl Future<Output = Result<Duration>> + Send;
}

/// Runs an external command that prints idle milliseconds, such as
/// `xprintidle` on X11.
#[derive(Debug, Clone)]
pub struct IdleCommand {
    program: String,
    args: Vec<String>,
}

impl IdleCommand {
    pub fn new(command: &[String]) -> Result<Self> {
        let Some((program, args)) = command.split_first() else {
            bail!("idle_command is empty");
        };
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }
}

impl IdleSource for IdleCommand {
    async fn idle_time(&self) -> Result<Duration> {
        let output = tokio::time::timeout(
            COMMAND_TIMEOUT,
            tokio::process::Command::new(&self.program)
                .args(&self.args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        .with_context(|| format!("{} timed out", self.program))?
        .with_context(|| format!("failed to run {}", self.program))?;

        if !output.status.success() {
            bail!("{} exited with {}", self.program, output.status);
        }
        parse_idle_millis(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parses an idle time printed as whole milliseconds.
pub fn parse_idle_millis(stdout: &str) -> Result<Duration> {
    let millis: u64 = stdout
        .trim()
        .parse()
        .with_context(|| format!("unexpected idle output: {:?}", stdout.trim()))?;
    Ok(Duration::from_millis(millis))
}
