//! The long-running tracker daemon.
//!
//! Runs one task per responsibility, all tied to a shared cancellation
//! token:
//!
//! - sampler: polls the idle source and feeds the activity tracker, and
//!   applies reset signals between ticks
//! - recompute: finalizes completed days on a fixed cadence
//! - enqueue: turns finished summaries into queued uploads
//! - processor: delivers the queue (only with an endpoint configured)
//!
//! On Unix, `SIGUSR1` tells the tracker the system resumed and `SIGUSR2`
//! that the clock changed. Ctrl-C or `SIGTERM` shuts everything down;
//! in-flight work is abandoned after a short grace period.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use st_core::SummaryReady;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::app::{App, local_now};
use crate::blocking;
use crate::enqueue::SummaryEnqueuer;
use crate::idle::{IdleCommand, IdleSource};
use crate::recompute::SummaryScheduler;
use crate::tracker::{ActivityTracker, TrackerSignal};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Runs the daemon until a shutdown signal arrives.
pub async fn run(app: App) -> Result<()> {
    let device = app.device()?;
    let source = IdleCommand::new(&app.config.idle_command)?;
    let processor = app.processor()?;
    let enqueuer = app.enqueuer()?;

    let cancel = CancellationToken::new();
    let (signal_tx, signal_rx) = mpsc::channel(8);
    let (ready_tx, ready_rx) = mpsc::channel(32);
    let mut tasks = JoinSet::new();

    tasks.spawn(sampling_loop(
        app.tracker(),
        source,
        signal_rx,
        app.config.sample_interval(),
        cancel.clone(),
    ));
    tasks.spawn(recompute_loop(
        app.scheduler(),
        ready_tx,
        app.config.recompute_interval(),
        cancel.clone(),
    ));
    tasks.spawn(enqueue_loop(enqueuer, ready_rx, cancel.clone()));

    match processor {
        Some(processor) => {
            tasks.spawn(processor.run(cancel.clone()));
        }
        None => tracing::warn!("no endpoint configured, uploads will stay queued"),
    }

    #[cfg(unix)]
    tasks.spawn(forward_unix_signals(signal_tx, cancel.clone()));
    #[cfg(not(unix))]
    drop(signal_tx);

    tracing::info!(
        device_id = %device.device_id,
        data_dir = %app.config.data_dir.display(),
        window = %app.config.nightly_window,
        "daemon started"
    );

    wait_for_shutdown().await?;
    tracing::info!("shutting down");
    cancel.cancel();

    let drained = tokio::time::timeout(SHUTDOWN_GRACE, async {
        while tasks.join_next().await.is_some() {}
    })
    .await;
    if drained.is_err() {
        tracing::warn!("abandoning in-flight work");
        tasks.abort_all();
    }
    Ok(())
}

async fn sampling_loop<P: IdleSource>(
    tracker: ActivityTracker,
    source: P,
    mut signals: mpsc::Receiver<TrackerSignal>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let tracker = Arc::new(Mutex::new(tracker));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    blocking::lock(&tracker).start();

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            Some(signal) = signals.recv() => blocking::lock(&tracker).handle_signal(signal),
            _ = ticker.tick() => match source.idle_time().await {
                Ok(idle) => {
                    let now = local_now();
                    let tracker = Arc::clone(&tracker);
                    let recorded = blocking::run(move || blocking::lock(&tracker).on_sample(now, idle)).await;
                    if let Err(err) = recorded {
                        tracing::error!(error = format!("{err:#}"), "failed to record sample");
                    }
                }
                Err(err) => tracing::warn!(error = format!("{err:#}"), "idle query failed, skipping tick"),
            },
        }
    }

    blocking::lock(&tracker).stop();
}

async fn recompute_loop(
    scheduler: SummaryScheduler,
    ready: mpsc::Sender<SummaryReady>,
    interval: Duration,
    cancel: CancellationToken,
) {
    let scheduler = Arc::new(scheduler);
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let today = local_now().date_naive();
                let scheduler = Arc::clone(&scheduler);
                let events = match blocking::run(move || {
                    Ok::<_, anyhow::Error>(scheduler.recompute_completed_days(today))
                })
                .await
                {
                    Ok(events) => events,
                    Err(err) => {
                        tracing::error!(error = format!("{err:#}"), "recompute pass failed");
                        continue;
                    }
                };
                for event in events {
                    if ready.send(event).await.is_err() {
                        tracing::warn!("enqueue task has stopped");
                        return;
                    }
                }
            }
        }
    }
}

async fn enqueue_loop(
    enqueuer: SummaryEnqueuer,
    mut ready: mpsc::Receiver<SummaryReady>,
    cancel: CancellationToken,
) {
    let enqueuer = Arc::new(Mutex::new(enqueuer));
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            event = ready.recv() => match event {
                Some(event) => {
                    let date = event.date;
                    let enqueuer = Arc::clone(&enqueuer);
                    let queued = blocking::run(move || blocking::lock(&enqueuer).handle(&event, local_now())).await;
                    if let Err(err) = queued {
                        tracing::error!(%date, error = format!("{err:#}"), "failed to enqueue summary");
                    }
                }
                None => break,
            },
        }
    }
}

#[cfg(unix)]
async fn forward_unix_signals(signals: mpsc::Sender<TrackerSignal>, cancel: CancellationToken) {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut resumed, mut clock_changed) =
        match (signal(SignalKind::user_defined1()), signal(SignalKind::user_defined2())) {
            (Ok(resumed), Ok(clock_changed)) => (resumed, clock_changed),
            (Err(err), _) | (_, Err(err)) => {
                tracing::warn!(error = %err, "cannot listen for tracker signals");
                return;
            }
        };

    loop {
        let signal = tokio::select! {
            () = cancel.cancelled() => break,
            _ = resumed.recv() => TrackerSignal::Resumed,
            _ = clock_changed.recv() => TrackerSignal::ClockChanged,
        };
        if signals.send(signal).await.is_err() {
            break;
        }
    }
}

async fn wait_for_shutdown() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut terminate = signal(SignalKind::terminate()).context("failed to listen for SIGTERM")?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
            _ = terminate.recv() => {}
        }
    }
    #[cfg(not(unix))]
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;
    Ok(())
}
