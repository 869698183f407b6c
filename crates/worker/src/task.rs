//! Cancellable repeating task.

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error};

/// Runs a closure once immediately, then once per `period`.
///
/// Runs never overlap: a run that outlasts the period delays the next one
/// instead of stacking. A run that panics is logged and the next tick runs
/// as usual. [`RepeatingTask::stop`] lets an in-flight run finish before the
/// task exits.
pub struct RepeatingTask {
    name: &'static str,
    period: Duration,
    stop_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl RepeatingTask {
    /// Spawns the task on the current tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut run: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {}
                }
                if let Err(e) = tokio::spawn(run()).await {
                    if e.is_panic() {
                        error!(task = name, error = %e, "Repeating task run panicked");
                    }
                }
            }

            debug!(task = name, "Repeating task exited");
        });

        debug!(task = name, period_ms = period.as_millis() as u64, "Repeating task started");

        Self {
            name,
            period,
            stop_tx,
            handle,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Signals the task and waits for the current run, if any, to finish.
    pub async fn stop(self) {
        let _ = self.stop_tx.send(true);
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                error!(task = self.name, error = %e, "Repeating task panicked");
            }
        }
    }
}
