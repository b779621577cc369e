//! Status command for showing tracker state and recent nights.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::Serialize;
use st_core::DailySummary;

use crate::App;
use crate::device;

/// Number of most recent days shown.
const RECENT_DAYS: usize = 7;

#[derive(Debug, Serialize)]
struct StatusReport {
    data_dir: PathBuf,
    device_id: Option<String>,
    label: Option<String>,
    nightly_window: String,
    endpoint: Option<String>,
    pending_uploads: usize,
    recent: Vec<DailySummary>,
}

fn collect(app: &App) -> Result<StatusReport> {
    let identity = device::load_from(&app.device_path())?;
    let summaries = app.storage.summaries().all().context("failed to read summaries")?;
    let skip = summaries.len().saturating_sub(RECENT_DAYS);

    Ok(StatusReport {
        data_dir: app.config.data_dir.clone(),
        device_id: identity.as_ref().map(|id| id.device_id.clone()),
        label: identity.map(|id| id.label),
        nightly_window: app.config.nightly_window.to_string(),
        endpoint: app.config.endpoint.clone(),
        pending_uploads: app.storage.queue().pending_count(),
        recent: summaries.into_iter().skip(skip).collect(),
    })
}

pub fn run<W: Write>(writer: &mut W, app: &App, json: bool) -> Result<()> {
    let report = collect(app)?;

    if json {
        serde_json::to_writer_pretty(&mut *writer, &report)?;
        writeln!(writer)?;
        return Ok(());
    }

    writeln!(writer, "Sleep tracker status")?;
    writeln!(writer, "Data dir: {}", report.data_dir.display())?;
    match (&report.device_id, &report.label) {
        (Some(id), Some(label)) => writeln!(writer, "Device:   {id} ({label})")?,
        _ => writeln!(writer, "Device:   not initialized (run `st init`)")?,
    }
    writeln!(writer, "Window:   {}", report.nightly_window)?;
    writeln!(
        writer,
        "Endpoint: {}",
        report.endpoint.as_deref().unwrap_or("not configured")
    )?;
    writeln!(writer, "Queued:   {} upload(s)", report.pending_uploads)?;

    if report.recent.is_empty() {
        writeln!(writer, "No nights recorded.")?;
        return Ok(());
    }

    writeln!(writer, "Recent nights:")?;
    for summary in &report.recent {
        let state = if summary.finalized { "final" } else { "live" };
        writeln!(
            writer,
            "- {}: {} min ({state}, {} samples)",
            summary.date, summary.total_sleep_minutes, summary.sample_count
        )?;
    }

    Ok(())
}
