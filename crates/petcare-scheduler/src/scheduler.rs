use std::sync::Arc;

use chrono::{DateTime, Utc};
use petcare_core::config::TIMER_TAG;
use petcare_core::reminder::due_text;
use petcare_core::{Notification, ReminderId, TimerName, TimerPayload};
use petcare_store::Reminder;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    backend::TimerBackend,
    error::Result,
    notify::{deliver, ChannelSpec, Delivery, Notifier, PermissionGate},
    recurrence::{fire_transition, next_fire_time},
    types::{FireOutcome, FireTransition, ReconcileReport, TimerRecord, TimerSpec},
};

/// Owns the mapping from reminder id to its single durable timer.
///
/// Every timer mutation in the process goes through `schedule`, `cancel` and
/// the engine-invoked `on_fire`. Construct one per process and share it as
/// `Arc<ReminderScheduler>`.
pub struct ReminderScheduler {
    backend: Arc<dyn TimerBackend>,
    notifier: Arc<dyn Notifier>,
    gate: Arc<dyn PermissionGate>,
    channel: ChannelSpec,
}

impl ReminderScheduler {
    pub fn new(
        backend: Arc<dyn TimerBackend>,
        notifier: Arc<dyn Notifier>,
        gate: Arc<dyn PermissionGate>,
        channel: ChannelSpec,
    ) -> Self {
        Self {
            backend,
            notifier,
            gate,
            channel,
        }
    }

    pub fn backend(&self) -> &Arc<dyn TimerBackend> {
        &self.backend
    }

    /// Schedule `reminder` relative to the current time.
    ///
    /// Returns the fire time of the installed timer, or `None` when the
    /// reminder is completed and was left unscheduled.
    pub async fn schedule(&self, reminder: &Reminder) -> Result<Option<DateTime<Utc>>> {
        self.schedule_at(reminder, Utc::now()).await
    }

    /// [`schedule`](Self::schedule) with an explicit clock.
    #[instrument(skip(self, reminder), fields(reminder_id = %reminder.id))]
    pub async fn schedule_at(
        &self,
        reminder: &Reminder,
        now: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        if reminder.completed {
            debug!("reminder completed, not scheduling");
            return Ok(None);
        }

        // Clamped: the delay is never negative.
        let fire_at = next_fire_time(now, reminder.due_at, reminder.repeat_minutes).max(now);
        let payload = TimerPayload::new(
            reminder.id,
            &reminder.title,
            due_text(reminder.due_at),
            reminder.repeat_minutes,
        );
        let record = self
            .backend
            .install_unique(TimerSpec {
                name: TimerName::for_reminder(reminder.id),
                reminder_id: reminder.id,
                fire_at,
                payload,
                tag: TIMER_TAG.to_string(),
            })
            .await?;

        info!(
            %fire_at,
            delay_secs = (fire_at - now).num_seconds(),
            generation = record.generation,
            "reminder scheduled"
        );
        Ok(Some(fire_at))
    }

    /// Remove the timer and any visible notification for `id`.
    ///
    /// Succeeds when nothing was scheduled.
    #[instrument(skip(self), fields(reminder_id = %id))]
    pub async fn cancel(&self, id: ReminderId) -> Result<()> {
        let removed = self
            .backend
            .cancel_by_name(&TimerName::for_reminder(id))
            .await?;
        self.notifier.dismiss(id);
        debug!(removed, "reminder cancelled");
        Ok(())
    }

    /// Fire handler, invoked by the engine for a claimed timer.
    ///
    /// Posts the notification from the stored snapshot, then either re-arms
    /// the timer or consumes it. Safe to run twice for the same fire: the
    /// second post overwrites the first and the generation guard turns the
    /// second re-arm into a no-op.
    #[instrument(skip(self, timer), fields(timer = %timer.name, generation = timer.generation))]
    pub async fn on_fire(&self, timer: &TimerRecord, fired_at: DateTime<Utc>) -> FireOutcome {
        let fallback_id = timer
            .name
            .reminder_id()
            .unwrap_or(timer.reminder_id);
        let payload = TimerPayload::decode_lossy(&timer.payload, fallback_id);
        if payload.id.get() <= 0 {
            error!("timer has no usable reminder id, dropping");
            return FireOutcome::Failure;
        }

        self.ensure_channel();
        let delivery = deliver(
            self.notifier.as_ref(),
            self.gate.as_ref(),
            Notification::for_payload(&payload, &self.channel.id),
        );
        if delivery == Delivery::Posted {
            info!(reminder_id = %payload.id, title = %payload.title, "reminder notification posted");
        }

        match fire_transition(&payload, fired_at) {
            FireTransition::Rearm { fire_at } => {
                match self.backend.rearm(&timer.name, timer.generation, fire_at).await {
                    Ok(true) => {
                        info!(next_fire = %fire_at, "repeating reminder re-armed");
                        FireOutcome::Success
                    }
                    Ok(false) => {
                        debug!("timer cancelled or replaced during fire, not re-arming");
                        FireOutcome::Success
                    }
                    Err(e) => {
                        warn!("re-arm failed, asking for retry: {e}");
                        FireOutcome::Retry
                    }
                }
            }
            FireTransition::Terminal => {
                match self.backend.complete(&timer.name, timer.generation).await {
                    Ok(_) => FireOutcome::Success,
                    Err(e) => {
                        warn!("could not consume fired timer, asking for retry: {e}");
                        FireOutcome::Retry
                    }
                }
            }
        }
    }

    /// Re-submit every reminder to [`schedule`](Self::schedule).
    ///
    /// Run at startup to repair drift between stored intent and the timer
    /// backend. Failures are counted and logged, never propagated.
    pub async fn reconcile(&self, reminders: &[Reminder]) -> ReconcileReport {
        let now = Utc::now();
        let mut report = ReconcileReport::default();
        for reminder in reminders {
            match self.schedule_at(reminder, now).await {
                Ok(Some(_)) => report.scheduled += 1,
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!(reminder_id = %reminder.id, "reconcile failed to schedule: {e}");
                    report.failed += 1;
                }
            }
        }
        info!(
            scheduled = report.scheduled,
            skipped = report.skipped,
            failed = report.failed,
            "reminders reconciled"
        );
        report
    }

    /// Create the reminder channel if absent. Best-effort.
    pub fn ensure_channel(&self) {
        if let Err(e) = self.notifier.ensure_channel(&self.channel) {
            warn!(channel = %self.channel.id, "could not create notification channel: {e}");
        }
    }

    /// Remove timers and channels left behind by older schemes.
    ///
    /// Every failure is logged and swallowed.
    pub async fn purge_legacy(&self, legacy_tags: &[String], legacy_channels: &[String]) {
        for channel_id in legacy_channels {
            if *channel_id == self.channel.id {
                continue;
            }
            if let Err(e) = self.notifier.delete_channel(channel_id) {
                debug!(channel = %channel_id, "legacy channel purge failed: {e}");
            }
        }
        for tag in legacy_tags {
            if tag == TIMER_TAG {
                continue;
            }
            match self.backend.cancel_by_tag(tag).await {
                Ok(0) => {}
                Ok(n) => info!(%tag, count = n, "legacy timers purged"),
                Err(e) => debug!(%tag, "legacy timer purge failed: {e}"),
            }
        }
    }

    /// The pending timer for `id`, if one is installed.
    pub async fn pending_timer(&self, id: ReminderId) -> Result<Option<TimerRecord>> {
        self.backend.get(&TimerName::for_reminder(id)).await
    }
}
