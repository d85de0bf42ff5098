//! Durable timers.
//!
//! A timer is a named row that survives process restarts. Installing under an
//! existing name replaces the row in one statement, so a reminder can never
//! own two live timers.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use petcare_core::types::{from_millis, to_millis};
use petcare_core::{ReminderId, TimerName};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use tracing::{debug, info, instrument, warn};

use crate::db::init_db;
use crate::error::{Result, SchedulerError};
use crate::types::{TimerRecord, TimerSpec, TimerStatus};

const TIMER_COLUMNS: &str = "name, reminder_id, fire_at, payload, tag, status, generation,
                             attempts, created_at, updated_at";

/// Storage for named, replace-on-conflict timers.
///
/// `rearm`, `complete` and `retry_later` only act on the row if it still has
/// the generation the caller claimed; they return `false` when the timer was
/// cancelled or replaced in the meantime.
#[async_trait]
pub trait TimerBackend: Send + Sync {
    /// Install `spec`, atomically replacing any timer with the same name.
    async fn install_unique(&self, spec: TimerSpec) -> Result<TimerRecord>;

    /// Remove a timer by name. Returns whether a row existed.
    async fn cancel_by_name(&self, name: &TimerName) -> Result<bool>;

    /// Remove every timer carrying `tag`. Returns how many were removed.
    async fn cancel_by_tag(&self, tag: &str) -> Result<usize>;

    /// Mark up to `limit` pending timers due at `now` as firing and return them.
    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TimerRecord>>;

    /// Move a fired timer to its next tick.
    async fn rearm(&self, name: &TimerName, generation: i64, fire_at: DateTime<Utc>)
        -> Result<bool>;

    /// Consume a fired timer.
    async fn complete(&self, name: &TimerName, generation: i64) -> Result<bool>;

    /// Put a fired timer back to pending at `fire_at`, keeping its attempt count.
    async fn retry_later(
        &self,
        name: &TimerName,
        generation: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Return timers left firing by a previous process to pending.
    async fn recover_in_flight(&self) -> Result<usize>;

    async fn get(&self, name: &TimerName) -> Result<Option<TimerRecord>>;

    /// All timers, soonest first.
    async fn list(&self) -> Result<Vec<TimerRecord>>;
}

/// SQLite-backed [`TimerBackend`]. All SQL runs on the blocking pool.
#[derive(Clone)]
pub struct SqliteTimerBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteTimerBackend {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().expect("timer connection poisoned");
            f(&mut guard)
        })
        .await?
    }
}

fn next_generation(tx: &Transaction<'_>) -> Result<i64> {
    tx.execute("UPDATE timer_generation SET value = value + 1 WHERE id = 1", [])?;
    let value = tx.query_row("SELECT value FROM timer_generation WHERE id = 1", [], |row| {
        row.get::<_, i64>(0)
    })?;
    Ok(value)
}

fn select_timer(conn: &Connection, name: &str) -> Result<Option<TimerRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {TIMER_COLUMNS} FROM timers WHERE name = ?1"),
            params![name],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

#[async_trait]
impl TimerBackend for SqliteTimerBackend {
    #[instrument(skip(self, spec), fields(timer = %spec.name, fire_at = %spec.fire_at))]
    async fn install_unique(&self, spec: TimerSpec) -> Result<TimerRecord> {
        let payload = serde_json::to_string(&spec.payload)?;
        self.with_conn(move |conn| {
            let now = to_millis(Utc::now());
            let tx = conn.transaction()?;
            let generation = next_generation(&tx)?;
            tx.execute(
                "INSERT INTO timers
                 (name, reminder_id, fire_at, payload, tag, status, generation,
                  attempts, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, 0, ?7, ?7)
                 ON CONFLICT(name) DO UPDATE SET
                    reminder_id = excluded.reminder_id,
                    fire_at     = excluded.fire_at,
                    payload     = excluded.payload,
                    tag         = excluded.tag,
                    status      = 'pending',
                    generation  = excluded.generation,
                    attempts    = 0,
                    updated_at  = excluded.updated_at",
                params![
                    spec.name.as_str(),
                    spec.reminder_id.get(),
                    to_millis(spec.fire_at),
                    payload,
                    spec.tag,
                    generation,
                    now
                ],
            )?;
            let record = select_timer(&tx, spec.name.as_str())?.ok_or_else(|| {
                SchedulerError::Backend(format!("timer {} vanished during install", spec.name))
            })?;
            tx.commit()?;
            debug!(generation, "timer installed");
            Ok(record)
        })
        .await
    }

    #[instrument(skip(self), fields(timer = %name))]
    async fn cancel_by_name(&self, name: &TimerName) -> Result<bool> {
        let name = name.clone();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM timers WHERE name = ?1", params![name.as_str()])?;
            Ok(n > 0)
        })
        .await
    }

    async fn cancel_by_tag(&self, tag: &str) -> Result<usize> {
        let tag = tag.to_string();
        self.with_conn(move |conn| {
            let n = conn.execute("DELETE FROM timers WHERE tag = ?1", params![tag])?;
            if n > 0 {
                info!(%tag, count = n, "timers cancelled by tag");
            }
            Ok(n)
        })
        .await
    }

    async fn claim_due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<TimerRecord>> {
        self.with_conn(move |conn| {
            let now_ms = to_millis(now);
            let tx = conn.transaction()?;
            let due: Vec<TimerRecord> = {
                let mut stmt = tx.prepare_cached(&format!(
                    "SELECT {TIMER_COLUMNS} FROM timers
                     WHERE status = 'pending' AND fire_at <= ?1
                     ORDER BY fire_at, name
                     LIMIT ?2"
                ))?;
                let rows = stmt
                    .query_map(params![now_ms, limit as i64], row_to_record)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                rows
            };

            let mut claimed = Vec::with_capacity(due.len());
            for mut record in due {
                let n = tx.execute(
                    "UPDATE timers SET status = 'firing', attempts = attempts + 1, updated_at = ?1
                     WHERE name = ?2 AND generation = ?3 AND status = 'pending'",
                    params![now_ms, record.name.as_str(), record.generation],
                )?;
                if n == 1 {
                    record.status = TimerStatus::Firing;
                    record.attempts += 1;
                    record.updated_at = from_millis(now_ms);
                    claimed.push(record);
                }
            }
            tx.commit()?;
            Ok(claimed)
        })
        .await
    }

    #[instrument(skip(self), fields(timer = %name))]
    async fn rearm(
        &self,
        name: &TimerName,
        generation: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<bool> {
        let name = name.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<i64> = tx
                .query_row(
                    "SELECT generation FROM timers WHERE name = ?1",
                    params![name.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            if current != Some(generation) {
                return Ok(false);
            }
            let next = next_generation(&tx)?;
            tx.execute(
                "UPDATE timers SET fire_at = ?1, status = 'pending', generation = ?2,
                        attempts = 0, updated_at = ?3
                 WHERE name = ?4",
                params![to_millis(fire_at), next, to_millis(Utc::now()), name.as_str()],
            )?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    #[instrument(skip(self), fields(timer = %name))]
    async fn complete(&self, name: &TimerName, generation: i64) -> Result<bool> {
        let name = name.clone();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "DELETE FROM timers WHERE name = ?1 AND generation = ?2",
                params![name.as_str(), generation],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn retry_later(
        &self,
        name: &TimerName,
        generation: i64,
        fire_at: DateTime<Utc>,
    ) -> Result<bool> {
        let name = name.clone();
        self.with_conn(move |conn| {
            let n = conn.execute(
                "UPDATE timers SET status = 'pending', fire_at = ?1, updated_at = ?2
                 WHERE name = ?3 AND generation = ?4",
                params![
                    to_millis(fire_at),
                    to_millis(Utc::now()),
                    name.as_str(),
                    generation
                ],
            )?;
            Ok(n > 0)
        })
        .await
    }

    async fn recover_in_flight(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE timers SET status = 'pending', updated_at = ?1 WHERE status = 'firing'",
                params![to_millis(Utc::now())],
            )?;
            if n > 0 {
                warn!(count = n, "timers left firing by a previous run returned to pending");
            }
            Ok(n)
        })
        .await
    }

    async fn get(&self, name: &TimerName) -> Result<Option<TimerRecord>> {
        let name = name.clone();
        self.with_conn(move |conn| select_timer(conn, name.as_str()))
            .await
    }

    async fn list(&self) -> Result<Vec<TimerRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TIMER_COLUMNS} FROM timers ORDER BY fire_at, name"
            ))?;
            let rows = stmt
                .query_map([], row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
        .await
    }
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<TimerRecord> {
    let status: String = row.get(5)?;
    Ok(TimerRecord {
        name: TimerName(row.get(0)?),
        reminder_id: ReminderId(row.get(1)?),
        fire_at: from_millis(row.get(2)?),
        payload: row.get(3)?,
        tag: row.get(4)?,
        // Unknown statuses come from a newer schema; treat them as not yet fired.
        status: status.parse().unwrap_or(TimerStatus::Pending),
        generation: row.get(6)?,
        attempts: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use petcare_core::TimerPayload;

    fn spec(id: i64, fire_at: DateTime<Utc>) -> TimerSpec {
        let reminder_id = ReminderId(id);
        TimerSpec {
            name: TimerName::for_reminder(reminder_id),
            reminder_id,
            fire_at,
            payload: TimerPayload::new(reminder_id, "Feed", "soon".into(), Some(60)),
            tag: "petcare-reminder-v2".to_string(),
        }
    }

    #[tokio::test]
    async fn install_twice_keeps_one_row() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        let first = backend.install_unique(spec(1, now)).await.unwrap();
        let second = backend
            .install_unique(spec(1, now + Duration::minutes(5)))
            .await
            .unwrap();

        assert!(second.generation > first.generation);
        let all = backend.list().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fire_at.timestamp_millis(), (now + Duration::minutes(5)).timestamp_millis());
    }

    #[tokio::test]
    async fn cancel_missing_timer_is_not_an_error() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let removed = backend
            .cancel_by_name(&TimerName::for_reminder(ReminderId(9)))
            .await
            .unwrap();
        assert!(!removed);
    }

    #[tokio::test]
    async fn claim_only_returns_due_pending_timers_once() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        backend.install_unique(spec(1, now - Duration::seconds(1))).await.unwrap();
        backend.install_unique(spec(2, now + Duration::hours(1))).await.unwrap();

        let claimed = backend.claim_due(now, 10).await.unwrap();
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].reminder_id, ReminderId(1));
        assert_eq!(claimed[0].status, TimerStatus::Firing);
        assert_eq!(claimed[0].attempts, 1);

        assert!(backend.claim_due(now, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rearm_after_cancel_is_a_no_op() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        backend.install_unique(spec(1, now)).await.unwrap();
        let claimed = backend.claim_due(now, 1).await.unwrap().remove(0);

        backend.cancel_by_name(&claimed.name).await.unwrap();
        let rearmed = backend
            .rearm(&claimed.name, claimed.generation, now + Duration::hours(1))
            .await
            .unwrap();
        assert!(!rearmed);
        assert!(backend.get(&claimed.name).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_generation_does_not_survive_cancel_and_reinstall() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        backend.install_unique(spec(1, now)).await.unwrap();
        let claimed = backend.claim_due(now, 1).await.unwrap().remove(0);

        backend.cancel_by_name(&claimed.name).await.unwrap();
        let fresh = backend
            .install_unique(spec(1, now + Duration::days(1)))
            .await
            .unwrap();
        assert_ne!(fresh.generation, claimed.generation);

        assert!(!backend.complete(&claimed.name, claimed.generation).await.unwrap());
        assert!(backend.get(&claimed.name).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn recover_returns_firing_rows_to_pending() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        backend.install_unique(spec(1, now)).await.unwrap();
        backend.claim_due(now, 1).await.unwrap();

        assert_eq!(backend.recover_in_flight().await.unwrap(), 1);
        assert_eq!(backend.claim_due(now, 1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn cancel_by_tag_spares_other_tags() {
        let backend = SqliteTimerBackend::open_in_memory().unwrap();
        let now = Utc::now();
        let mut legacy = spec(1, now);
        legacy.tag = "legacy".to_string();
        backend.install_unique(legacy).await.unwrap();
        backend.install_unique(spec(2, now)).await.unwrap();

        assert_eq!(backend.cancel_by_tag("legacy").await.unwrap(), 1);
        let left = backend.list().await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].reminder_id, ReminderId(2));
    }
}
