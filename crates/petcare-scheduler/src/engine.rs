use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use petcare_core::config::SchedulerConfig;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::{
    error::Result,
    scheduler::ReminderScheduler,
    types::{FireOutcome, TickReport, TimerRecord},
};

/// Upper bound on the configured retry backoff (one day).
const MAX_BACKOFF_SECS: u64 = 86_400;

/// Drives durable timers: claims due rows and runs the fire handler.
///
/// Timers for different reminders fire concurrently; a single reminder never
/// has more than one claimed timer because claiming flips the row to `firing`.
pub struct TimerEngine {
    scheduler: Arc<ReminderScheduler>,
    config: SchedulerConfig,
    /// Set when a tick left claimed rows unsettled.
    stranded: AtomicBool,
}

impl TimerEngine {
    pub fn new(scheduler: Arc<ReminderScheduler>, config: SchedulerConfig) -> Self {
        Self {
            scheduler,
            config,
            stranded: AtomicBool::new(false),
        }
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true`.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            "timer engine started"
        );
        if let Err(e) = self.scheduler.backend().recover_in_flight().await {
            error!("in-flight timer recovery failed: {e}");
        }

        let period = std::time::Duration::from_millis(self.config.poll_interval_ms.max(1));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!("timer engine tick error: {e}");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("timer engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Fire every timer due at `now`.
    ///
    /// Only claiming can fail the tick. Once timers are claimed every fire is
    /// driven to completion; a follow-up backend error is counted in
    /// [`TickReport::failed`] and the stranded rows are returned to `pending`.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let backend = self.scheduler.backend();
        if self.stranded.load(Ordering::Acquire) {
            self.release_stranded().await;
        }

        let due = backend
            .claim_due(now, self.config.claim_batch.max(1))
            .await?;
        let mut report = TickReport::default();
        if due.is_empty() {
            return Ok(report);
        }

        let mut fires = JoinSet::new();
        for timer in due {
            let scheduler = Arc::clone(&self.scheduler);
            fires.spawn(async move {
                let outcome = scheduler.on_fire(&timer, now).await;
                (timer, outcome)
            });
        }

        while let Some(joined) = fires.join_next().await {
            let (timer, outcome) = match joined {
                Ok(done) => done,
                Err(e) => {
                    error!("fire handler task failed: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            let settled = match outcome {
                FireOutcome::Success => {
                    report.fired += 1;
                    Ok(())
                }
                FireOutcome::Retry => self.retry_or_drop(&timer, now).await.map(|queued| {
                    if queued {
                        report.retried += 1;
                    } else {
                        report.dropped += 1;
                    }
                }),
                FireOutcome::Failure => backend
                    .complete(&timer.name, timer.generation)
                    .await
                    .map(|_| report.dropped += 1),
            };
            if let Err(e) = settled {
                error!(timer = %timer.name, "could not settle fired timer: {e}");
                report.failed += 1;
            }
        }

        if report.failed > 0 {
            self.stranded.store(true, Ordering::Release);
            self.release_stranded().await;
        }
        Ok(report)
    }

    /// Return rows left `firing` by an unsettled fire to `pending`.
    ///
    /// Every claimed fire of this engine has finished when this runs, so any
    /// `firing` row is stranded. On failure the next tick tries again.
    async fn release_stranded(&self) {
        match self.scheduler.backend().recover_in_flight().await {
            Ok(n) => {
                self.stranded.store(false, Ordering::Release);
                if n > 0 {
                    warn!(count = n, "stranded timers returned to pending");
                }
            }
            Err(e) => warn!("could not release stranded timers, will retry: {e}"),
        }
    }

    /// Re-queue a fire that asked for a retry. Returns `false` once the
    /// attempt budget is spent and the timer has been dropped instead.
    async fn retry_or_drop(&self, timer: &TimerRecord, now: DateTime<Utc>) -> Result<bool> {
        let backend = self.scheduler.backend();
        if timer.attempts >= self.config.max_fire_attempts {
            error!(
                timer = %timer.name,
                attempts = timer.attempts,
                "timer exceeded fire attempts, dropping"
            );
            backend.complete(&timer.name, timer.generation).await?;
            return Ok(false);
        }
        let backoff = self.config.retry_backoff_secs.min(MAX_BACKOFF_SECS) as i64;
        let at = now + Duration::seconds(backoff);
        backend.retry_later(&timer.name, timer.generation, at).await?;
        warn!(timer = %timer.name, attempts = timer.attempts, retry_at = %at, "timer fire will be retried");
        Ok(true)
    }
}
