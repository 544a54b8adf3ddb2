use super::job::{CycleRun, PaymentJob};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Notify, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Drives `PaymentJob` cycles: once at start, then every `interval`, plus on demand.
///
/// Each tick spawns its cycle so that a slow cycle does not delay the timer; overlapping
/// ticks are turned away by the job's single-flight flag.
pub struct Scheduler {
    job: Arc<PaymentJob>,
    interval: Duration,
    trigger: Arc<Notify>,
    shutdown: Option<watch::Sender<bool>>,
    handle: Option<JoinHandle<()>>,
}

impl Scheduler {
    /// Creates a new, stopped scheduler ticking every `interval`.
    pub fn new(job: Arc<PaymentJob>, interval: Duration) -> Self {
        Self {
            job,
            interval,
            trigger: Arc::new(Notify::new()),
            shutdown: None,
            handle: None,
        }
    }

    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Spawns the timer loop. Calling it again while started does nothing.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        let (tx, rx) = watch::channel(false);
        let job = Arc::clone(&self.job);
        let trigger = Arc::clone(&self.trigger);
        let interval = self.interval;
        info!(interval_secs = interval.as_secs(), "payment scheduler started");
        self.handle = Some(tokio::spawn(run_loop(job, interval, trigger, rx)));
        self.shutdown = Some(tx);
    }

    /// Requests a cycle outside the regular cadence.
    pub fn trigger_now(&self) {
        self.trigger.notify_one();
    }

    /// Stops the timer and waits for in-flight cycles to finish.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(true);
        }
        if let Some(handle) = self.handle.take()
            && let Err(e) = handle.await
        {
            error!(error = %e, "scheduler loop terminated abnormally");
        }
        info!("payment scheduler stopped");
    }
}

async fn run_loop(
    job: Arc<PaymentJob>,
    interval: Duration,
    trigger: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = ticker.tick() => spawn_cycle(&job, &mut in_flight, "interval"),
            _ = trigger.notified() => spawn_cycle(&job, &mut in_flight, "manual"),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            Some(joined) = in_flight.join_next() => {
                if let Err(e) = joined {
                    error!(error = %e, "verification cycle panicked");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "verification cycle panicked");
        }
    }
}

fn spawn_cycle(job: &Arc<PaymentJob>, in_flight: &mut JoinSet<()>, source: &'static str) {
    let job = Arc::clone(job);
    in_flight.spawn(async move {
        debug!(source, "starting verification cycle");
        match job.run_cycle(Utc::now()).await {
            Ok(CycleRun::Completed(_)) | Ok(CycleRun::Skipped) => {}
            // Already logged by the job; the next tick retries.
            Err(e) => debug!(source, error = %e, "cycle ended with error"),
        }
    });
}
