use rusqlite::Connection;

use crate::error::Result;

/// Initialise the durable timer schema in `conn`.
///
/// Creates the `timers` table (idempotent), an index on `fire_at` so the
/// polling query stays cheap, and the generation counter row.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS timers (
            name         TEXT    NOT NULL PRIMARY KEY,
            reminder_id  INTEGER NOT NULL,
            fire_at      INTEGER NOT NULL,   -- epoch millis
            payload      TEXT    NOT NULL,   -- JSON TimerPayload snapshot
            tag          TEXT    NOT NULL,
            status       TEXT    NOT NULL DEFAULT 'pending',
            generation   INTEGER NOT NULL,
            attempts     INTEGER NOT NULL DEFAULT 0,
            created_at   INTEGER NOT NULL,
            updated_at   INTEGER NOT NULL
        ) STRICT;

        -- Polling: SELECT … WHERE status = 'pending' AND fire_at <= ? ORDER BY fire_at
        CREATE INDEX IF NOT EXISTS idx_timers_fire_at ON timers (status, fire_at);
        CREATE INDEX IF NOT EXISTS idx_timers_tag ON timers (tag);

        -- Monotonic across deletes, so a re-created slot never reuses an old generation.
        CREATE TABLE IF NOT EXISTS timer_generation (
            id     INTEGER NOT NULL PRIMARY KEY CHECK (id = 1),
            value  INTEGER NOT NULL
        ) STRICT;
        INSERT OR IGNORE INTO timer_generation (id, value) VALUES (1, 0);
        ",
    )?;
    Ok(())
}
