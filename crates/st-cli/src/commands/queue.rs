//! Queue commands for inspecting and managing pending uploads.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};

use crate::App;

/// Lists pending uploads, oldest first.
pub fn list<W: Write>(writer: &mut W, app: &App) -> Result<()> {
    let queue = app.storage.queue();
    let ids = queue.list().context("failed to list upload queue")?;
    if ids.is_empty() {
        writeln!(writer, "Queue is empty.")?;
        return Ok(());
    }

    for id in ids {
        match queue.read(&id) {
            Some(record) => {
                let note = if record.message.is_some() { " (with message)" } else { "" };
                writeln!(
                    writer,
                    "{id}  {}  {} min{note}",
                    record.date, record.sleep_minutes
                )?;
            }
            None => writeln!(writer, "{id}  unreadable")?,
        }
    }

    Ok(())
}

/// Deletes uploads older than `days` (or the configured retention).
pub fn purge<W: Write>(writer: &mut W, app: &App, days: Option<u32>, now: DateTime<Utc>) -> Result<()> {
    let days = days.unwrap_or(app.config.queue_retention_days);
    let purged = app
        .storage
        .queue()
        .purge_older_than(days, now)
        .context("failed to purge upload queue")?;
    writeln!(writer, "Purged {purged} upload(s) older than {days} day(s).")?;
    Ok(())
}

/// Attempts every pending upload once, stopping at the first failure.
pub async fn flush<W: Write>(writer: &mut W, app: &App) -> Result<()> {
    let Some(mut processor) = app.processor()? else {
        bail!("no endpoint configured; set `endpoint` in the config file or ST_ENDPOINT");
    };
    let report = processor.flush().await;
    writeln!(
        writer,
        "Delivered {}, dropped {}, {} still queued",
        report.delivered, report.dropped, report.remaining
    )?;
    Ok(())
}
