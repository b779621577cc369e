//! Send-now command: finalize yesterday and deliver it right away.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::App;

pub async fn run<W: Write>(writer: &mut W, app: &App, now: DateTime<FixedOffset>) -> Result<()> {
    let Some(event) = app.scheduler().send_now(now.date_naive())? else {
        writeln!(writer, "No samples recorded yesterday.")?;
        return Ok(());
    };

    writeln!(
        writer,
        "{}: {} min of sleep",
        event.date, event.summary.total_sleep_minutes
    )?;
    if let Some(id) = app.enqueuer()?.handle(&event, now)? {
        writeln!(writer, "Queued {id}")?;
    }

    let Some(mut processor) = app.processor()? else {
        writeln!(writer, "No endpoint configured, upload left in the queue.")?;
        return Ok(());
    };
    let report = processor.flush().await;
    writeln!(
        writer,
        "Delivered {}, {} still queued",
        report.delivered, report.remaining
    )?;

    Ok(())
}
