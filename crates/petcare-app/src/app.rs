use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use petcare_core::config::PetcareConfig;
use petcare_core::{PetId, PetcareError, ReminderId, Result};
use petcare_scheduler::{
    ChannelSpec, NotificationCenter, Notifier, ReconcileReport, ReminderScheduler,
    SqliteTimerBackend, TimerBackend, TimerEngine, TimerRecord,
};
use petcare_store::{NewPet, NewReminder, Pet, PetStore, Reminder};
use rusqlite::Connection;
use tracing::{debug, info, instrument, warn};

/// How long a connection waits on a lock held by another process (CLI vs daemon).
const BUSY_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Process-wide service context.
///
/// Created once at start and passed by reference to every caller; there is
/// no global state behind it.
///
/// Async operations run their store calls on the blocking pool. The plain
/// `fn` accessors (`add_pet`, `list_pets`, ...) hit SQLite on the caller's
/// thread.
///
/// Visible notifications live in the process that posted them. A reminder
/// deleted or completed from another process (the CLI next to a running
/// daemon) is withdrawn by the daemon's [`dismiss_stale`](Self::dismiss_stale)
/// sweep, not by the call itself.
pub struct PetCare {
    pub config: PetcareConfig,
    store: Arc<PetStore>,
    scheduler: Arc<ReminderScheduler>,
    notifications: Arc<NotificationCenter>,
}

impl PetCare {
    /// Open (or create) the database at `config.database.path`.
    ///
    /// Store and timers share the file but each gets its own connection.
    pub fn open(config: PetcareConfig) -> Result<Self> {
        let path = config.database.path.clone();
        ensure_parent_dir(&path)?;
        info!(path = %path, "opening SQLite database");

        let store = PetStore::new(open_connection(&path)?)?;
        let backend = SqliteTimerBackend::new(open_connection(&path)?)?;
        Ok(Self::from_parts(config, store, Arc::new(backend)))
    }

    /// Assemble from already-built parts.
    pub fn from_parts(
        config: PetcareConfig,
        store: PetStore,
        backend: Arc<dyn TimerBackend>,
    ) -> Self {
        let notifications = Arc::new(NotificationCenter::new(
            config.notifications.permission_granted,
        ));
        let channel = ChannelSpec {
            id: config.notifications.channel_id.clone(),
            name: config.notifications.channel_name.clone(),
            description: config.notifications.description.clone(),
        };
        let scheduler = Arc::new(ReminderScheduler::new(
            backend,
            notifications.clone(),
            notifications.clone(),
            channel,
        ));
        Self {
            config,
            store: Arc::new(store),
            scheduler,
            notifications,
        }
    }

    pub fn notifications(&self) -> &Arc<NotificationCenter> {
        &self.notifications
    }

    pub fn scheduler(&self) -> &Arc<ReminderScheduler> {
        &self.scheduler
    }

    pub fn store(&self) -> &PetStore {
        &self.store
    }

    /// One-time initialisation on every launch.
    ///
    /// Creates the notification channel, purges artifacts of older schemes,
    /// returns timers stranded mid-fire to pending, and re-schedules every
    /// incomplete reminder.
    pub async fn startup(&self) -> Result<ReconcileReport> {
        self.scheduler.ensure_channel();
        self.scheduler
            .purge_legacy(
                &self.config.notifications.legacy_timer_tags,
                &self.config.notifications.legacy_channel_ids,
            )
            .await;
        if let Err(e) = self.scheduler.backend().recover_in_flight().await {
            warn!("in-flight timer recovery failed: {e}");
        }
        let pending = self.with_store(|store| store.list_pending()).await?;
        Ok(self.scheduler.reconcile(&pending).await)
    }

    /// Background loop that fires due timers.
    pub fn engine(&self) -> TimerEngine {
        TimerEngine::new(Arc::clone(&self.scheduler), self.config.scheduler.clone())
    }

    // --- pets --------------------------------------------------------------

    pub fn add_pet(&self, pet: NewPet) -> Result<Pet> {
        Ok(self.store.insert_pet(pet)?)
    }

    pub fn pet(&self, id: PetId) -> Result<Option<Pet>> {
        Ok(self.store.get_pet(id)?)
    }

    pub fn list_pets(&self) -> Result<Vec<Pet>> {
        Ok(self.store.list_pets()?)
    }

    /// Delete a pet and every reminder attached to it by name.
    ///
    /// Each reminder's timer is cancelled before its row is deleted, then the
    /// pet goes. Returns the ids of the removed reminders.
    #[instrument(skip(self))]
    pub async fn delete_pet(&self, id: PetId) -> Result<Vec<ReminderId>> {
        let pet = self
            .with_store(move |store| store.get_pet(id))
            .await?
            .ok_or_else(|| PetcareError::PetNotFound {
                name: format!("#{id}"),
            })?;

        let name = pet.name.clone();
        let ids = self
            .with_store(move |store| store.reminder_ids_for_pet(&name))
            .await?;
        for &reminder_id in &ids {
            self.scheduler.cancel(reminder_id).await?;
            self.with_store(move |store| store.delete_reminder(reminder_id))
                .await?;
        }
        self.with_store(move |store| store.delete_pet(id)).await?;
        info!(pet = %pet.name, reminders = ids.len(), "pet and its reminders deleted");
        Ok(ids)
    }

    // --- reminders ---------------------------------------------------------

    /// Insert a reminder and schedule it.
    ///
    /// Returns the stored reminder and its first fire time.
    #[instrument(skip(self, reminder), fields(cat = ?reminder.cat_name))]
    pub async fn add_reminder(
        &self,
        reminder: NewReminder,
    ) -> Result<(Reminder, Option<DateTime<Utc>>)> {
        if let Some(name) = reminder.cat_name.clone() {
            let lookup = name.clone();
            let found = self
                .with_store(move |store| store.find_pet_by_name(&lookup))
                .await?;
            if found.is_none() {
                return Err(PetcareError::PetNotFound { name });
            }
        }
        let stored = self
            .with_store(move |store| store.insert_reminder(reminder))
            .await?;
        let fire_at = self.scheduler.schedule(&stored).await?;
        Ok((stored, fire_at))
    }

    /// Cancel the timer, then delete the row.
    #[instrument(skip(self))]
    pub async fn delete_reminder(&self, id: ReminderId) -> Result<()> {
        self.scheduler.cancel(id).await?;
        self.with_store(move |store| store.delete_reminder(id))
            .await
    }

    /// Mark a reminder done (cancelling its timer) or open again (re-scheduling it).
    #[instrument(skip(self))]
    pub async fn set_completed(&self, id: ReminderId, completed: bool) -> Result<()> {
        if completed {
            self.scheduler.cancel(id).await?;
            return self
                .with_store(move |store| store.set_completed(id, true))
                .await;
        }

        let reminder = self
            .with_store(move |store| {
                store.set_completed(id, false)?;
                store.get_reminder(id)
            })
            .await?
            .ok_or(PetcareError::ReminderNotFound { id: id.get() })?;
        self.scheduler.schedule(&reminder).await?;
        Ok(())
    }

    pub fn list_reminders(&self) -> Result<Vec<Reminder>> {
        Ok(self.store.list_reminders()?)
    }

    /// The pending timer for a reminder, if any.
    pub async fn reminder_timer(&self, id: ReminderId) -> Result<Option<TimerRecord>> {
        Ok(self.scheduler.pending_timer(id).await?)
    }

    /// Withdraw visible notifications whose reminder was deleted or completed,
    /// possibly by another process. Returns how many were dismissed.
    pub async fn dismiss_stale(&self) -> Result<usize> {
        let visible = self.notifications.visible_ids();
        if visible.is_empty() {
            return Ok(0);
        }
        let stale = self
            .with_store(move |store| {
                let mut stale = Vec::new();
                for id in visible {
                    match store.get_reminder(id)? {
                        Some(r) if !r.completed => {}
                        _ => stale.push(id),
                    }
                }
                Ok(stale)
            })
            .await?;
        for id in &stale {
            self.notifications.dismiss(*id);
        }
        if !stale.is_empty() {
            debug!(count = stale.len(), "stale notifications dismissed");
        }
        Ok(stale.len())
    }

    async fn with_store<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&PetStore) -> petcare_store::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let out = tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| PetcareError::Internal(format!("store task failed: {e}")))?;
        Ok(out?)
    }
}

fn open_connection(path: &str) -> Result<Connection> {
    let conn = Connection::open(path).map_err(|e| PetcareError::Database(e.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .map_err(|e| PetcareError::Database(e.to_string()))?;
    conn.busy_timeout(BUSY_TIMEOUT)
        .map_err(|e| PetcareError::Database(e.to_string()))?;
    Ok(conn)
}

fn ensure_parent_dir(path: &str) -> Result<()> {
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
