use rusqlite::{Connection, Result};

/// Initialise the pet and reminder tables. Safe to call on every startup (idempotent).
pub fn init_db(conn: &Connection) -> Result<()> {
    create_pets_table(conn)?;
    create_reminders_table(conn)?;
    Ok(())
}

fn create_pets_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pets (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            name          TEXT    NOT NULL,
            age_years     INTEGER NOT NULL DEFAULT 0,
            age_months    INTEGER NOT NULL DEFAULT 0,
            breed         TEXT    NOT NULL DEFAULT '',
            color         TEXT    NOT NULL DEFAULT '',
            favorite_food TEXT    NOT NULL DEFAULT '',
            photo_uri     TEXT,
            created_at    INTEGER NOT NULL
        );",
    )
}

/// Timestamps are epoch milliseconds. `cat_name` links a reminder to a pet by
/// name, which is what the delete-pet cascade queries on.
fn create_reminders_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS reminders (
            id             INTEGER PRIMARY KEY AUTOINCREMENT,
            title          TEXT    NOT NULL,
            completed      INTEGER NOT NULL DEFAULT 0,
            created_at     INTEGER NOT NULL,
            due_at         INTEGER,
            repeat_minutes INTEGER,
            cat_name       TEXT,
            activity       TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_reminders_cat
            ON reminders(cat_name);",
    )
}
