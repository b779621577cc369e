//! Recompute command for finalizing completed days on demand.

use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, FixedOffset};

use crate::App;

/// Recomputes the look-back window ending yesterday and queues changed days.
pub fn run<W: Write>(writer: &mut W, app: &App, now: DateTime<FixedOffset>) -> Result<()> {
    let events = app.scheduler().recompute_completed_days(now.date_naive());
    if events.is_empty() {
        writeln!(writer, "No completed days changed.")?;
        return Ok(());
    }

    let mut enqueuer = app.enqueuer()?;
    for event in &events {
        match enqueuer.handle(event, now)? {
            Some(id) => writeln!(
                writer,
                "{}: {} min, queued {id}",
                event.date, event.summary.total_sleep_minutes
            )?,
            None => writeln!(writer, "{}: no data", event.date)?,
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use st_core::ActivitySample;
    use st_store::SampleRecord;

    use super::*;
    use crate::Config;

    fn log_run(app: &App, from: &str, count: i32, is_active: bool) {
        let start = DateTime::parse_from_rfc3339(from).unwrap();
        for step in 0..count {
            let sample = ActivitySample {
                timestamp: start + TimeDelta::minutes(i64::from(step) * 10),
                is_active,
                idle_minutes: if is_active { 0.0 } else { 30.0 },
            };
            app.storage.samples().append(&SampleRecord::new(&sample, 0)).unwrap();
        }
    }

    #[test]
    fn recompute_queues_changed_days_once() {
        let temp = tempfile::tempdir().unwrap();
        let app = App::open(Config {
            data_dir: temp.path().to_path_buf(),
            ..Config::default()
        })
        .unwrap();
        // Quiet from 00:00 to 06:00, then active until 08:00.
        log_run(&app, "2024-06-02T00:00:00+02:00", 36, false);
        log_run(&app, "2024-06-02T06:00:00+02:00", 12, true);
        let now = DateTime::parse_from_rfc3339("2024-06-03T09:00:00+02:00").unwrap();

        let mut output = Vec::new();
        run(&mut output, &app, now).unwrap();
        let output = String::from_utf8(output).unwrap();
        assert!(output.starts_with("2024-06-02: 300 min, queued "), "{output}");
        assert_eq!(app.storage.queue().pending_count(), 1);

        let mut again = Vec::new();
        run(&mut again, &app, now).unwrap();
        assert_eq!(String::from_utf8(again).unwrap(), "No completed days changed.\n");
        assert_eq!(app.storage.queue().pending_count(), 1);
    }
}
