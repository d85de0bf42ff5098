use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use petcare_core::types::{from_millis, to_millis};
use petcare_core::{PetId, ReminderId};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, instrument};

use crate::db::init_db;
use crate::error::{Result, StoreError};
use crate::types::{NewPet, NewReminder, Pet, Reminder};

const PET_COLUMNS: &str = "id, name, age_years, age_months, breed, color, favorite_food,
                           photo_uri, created_at";
const REMINDER_COLUMNS: &str = "id, title, completed, created_at, due_at, repeat_minutes,
                                cat_name, activity";

/// Thread-safe store for pets and reminders.
///
/// Wraps a single SQLite connection in a `Mutex`. Every method is a short
/// synchronous transaction; async callers are expected to be fine with that
/// for a single-user local database.
pub struct PetStore {
    db: Mutex<Connection>,
}

impl PetStore {
    /// Wrap an open connection, creating the schema if needed.
    pub fn new(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(Self {
            db: Mutex::new(conn),
        })
    }

    /// In-memory store, used by tests and dry runs.
    pub fn open_in_memory() -> Result<Self> {
        Self::new(Connection::open_in_memory()?)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().expect("store connection poisoned")
    }

    // --- pets --------------------------------------------------------------

    /// Insert a pet, replacing any existing row when `pet.id` is set.
    #[instrument(skip(self, pet), fields(name = %pet.name))]
    pub fn insert_pet(&self, pet: NewPet) -> Result<Pet> {
        pet.validate()?;
        let now = to_millis(Utc::now());
        let db = self.conn();
        db.execute(
            "INSERT OR REPLACE INTO pets
             (id, name, age_years, age_months, breed, color, favorite_food, photo_uri, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                pet.id.map(PetId::get),
                pet.name.trim(),
                pet.age_years,
                pet.age_months,
                pet.breed,
                pet.color,
                pet.favorite_food,
                pet.photo_uri,
                now
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(pet_id = id, "pet saved");

        db.query_row(
            &format!("SELECT {PET_COLUMNS} FROM pets WHERE id = ?1"),
            params![id],
            row_to_pet,
        )
        .map_err(StoreError::from)
    }

    pub fn get_pet(&self, id: PetId) -> Result<Option<Pet>> {
        let db = self.conn();
        let pet = db
            .query_row(
                &format!("SELECT {PET_COLUMNS} FROM pets WHERE id = ?1 LIMIT 1"),
                params![id.get()],
                row_to_pet,
            )
            .optional()?;
        Ok(pet)
    }

    /// First pet with exactly this name, if any.
    pub fn find_pet_by_name(&self, name: &str) -> Result<Option<Pet>> {
        let db = self.conn();
        let pet = db
            .query_row(
                &format!("SELECT {PET_COLUMNS} FROM pets WHERE name = ?1 ORDER BY id LIMIT 1"),
                params![name],
                row_to_pet,
            )
            .optional()?;
        Ok(pet)
    }

    /// All pets, newest first.
    pub fn list_pets(&self) -> Result<Vec<Pet>> {
        let db = self.conn();
        let mut stmt = db.prepare(&format!("SELECT {PET_COLUMNS} FROM pets ORDER BY id DESC"))?;
        let pets = stmt
            .query_map([], row_to_pet)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pets)
    }

    /// Delete the pet row only. Reminder cleanup is the caller's job.
    #[instrument(skip(self))]
    pub fn delete_pet(&self, id: PetId) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM pets WHERE id = ?1", params![id.get()])?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "pet",
                id: id.get(),
            });
        }
        info!("pet deleted");
        Ok(())
    }

    // --- reminders ---------------------------------------------------------

    #[instrument(skip(self, reminder), fields(cat = ?reminder.cat_name))]
    pub fn insert_reminder(&self, reminder: NewReminder) -> Result<Reminder> {
        let title = reminder.resolved_title()?;
        let now = to_millis(Utc::now());
        let db = self.conn();
        db.execute(
            "INSERT INTO reminders
             (title, completed, created_at, due_at, repeat_minutes, cat_name, activity)
             VALUES (?1, 0, ?2, ?3, ?4, ?5, ?6)",
            params![
                title,
                now,
                reminder.due_at.map(to_millis),
                reminder.repeat_minutes,
                reminder.cat_name,
                reminder.activity
            ],
        )?;
        let id = db.last_insert_rowid();
        info!(reminder_id = id, "reminder inserted");

        Ok(Reminder {
            id: ReminderId(id),
            title,
            completed: false,
            created_at: from_millis(now),
            due_at: reminder.due_at,
            repeat_minutes: reminder.repeat_minutes,
            cat_name: reminder.cat_name,
            activity: reminder.activity,
        })
    }

    pub fn get_reminder(&self, id: ReminderId) -> Result<Option<Reminder>> {
        let db = self.conn();
        let reminder = db
            .query_row(
                &format!("SELECT {REMINDER_COLUMNS} FROM reminders WHERE id = ?1"),
                params![id.get()],
                row_to_reminder,
            )
            .optional()?;
        Ok(reminder)
    }

    /// Every reminder: incomplete first, then newest first.
    pub fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.query_reminders(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders ORDER BY completed ASC, created_at DESC, id DESC"
        ))
    }

    /// Reminders that still need a timer (not completed).
    pub fn list_pending(&self) -> Result<Vec<Reminder>> {
        self.query_reminders(&format!(
            "SELECT {REMINDER_COLUMNS} FROM reminders WHERE completed = 0 ORDER BY id"
        ))
    }

    fn query_reminders(&self, sql: &str) -> Result<Vec<Reminder>> {
        let db = self.conn();
        let mut stmt = db.prepare(sql)?;
        let reminders = stmt
            .query_map([], row_to_reminder)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(reminders)
    }

    #[instrument(skip(self))]
    pub fn set_completed(&self, id: ReminderId, completed: bool) -> Result<()> {
        let n = self.conn().execute(
            "UPDATE reminders SET completed = ?1 WHERE id = ?2",
            params![completed, id.get()],
        )?;
        if n == 0 {
            return Err(StoreError::NotFound {
                what: "reminder",
                id: id.get(),
            });
        }
        debug!("reminder completion updated");
        Ok(())
    }

    /// Delete a reminder. Missing rows are not an error.
    #[instrument(skip(self))]
    pub fn delete_reminder(&self, id: ReminderId) -> Result<()> {
        let n = self
            .conn()
            .execute("DELETE FROM reminders WHERE id = ?1", params![id.get()])?;
        debug!(deleted = n, "reminder delete");
        Ok(())
    }

    /// Ids of every reminder attached to the pet with this name.
    pub fn reminder_ids_for_pet(&self, name: &str) -> Result<Vec<ReminderId>> {
        let db = self.conn();
        let mut stmt = db.prepare("SELECT id FROM reminders WHERE cat_name = ?1 ORDER BY id")?;
        let ids = stmt
            .query_map(params![name], |row| row.get::<_, i64>(0).map(ReminderId))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }
}

fn row_to_pet(row: &Row<'_>) -> rusqlite::Result<Pet> {
    Ok(Pet {
        id: PetId(row.get(0)?),
        name: row.get(1)?,
        age_years: row.get(2)?,
        age_months: row.get(3)?,
        breed: row.get(4)?,
        color: row.get(5)?,
        favorite_food: row.get(6)?,
        photo_uri: row.get(7)?,
        created_at: from_millis(row.get(8)?),
    })
}

fn row_to_reminder(row: &Row<'_>) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: ReminderId(row.get(0)?),
        title: row.get(1)?,
        completed: row.get(2)?,
        created_at: from_millis(row.get(3)?),
        due_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
        repeat_minutes: row.get(5)?,
        cat_name: row.get(6)?,
        activity: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_pet_with_existing_id_replaces() {
        let store = PetStore::open_in_memory().unwrap();
        let milo = store.insert_pet(NewPet::named("Milo")).unwrap();

        let mut update = NewPet::named("Milo");
        update.id = Some(milo.id);
        update.breed = "Tabby".to_string();
        let updated = store.insert_pet(update).unwrap();

        assert_eq!(updated.id, milo.id);
        assert_eq!(updated.breed, "Tabby");
        assert_eq!(store.list_pets().unwrap().len(), 1);
    }

    #[test]
    fn blank_pet_name_rejected() {
        let store = PetStore::open_in_memory().unwrap();
        assert!(matches!(
            store.insert_pet(NewPet::named("   ")),
            Err(StoreError::Invalid(_))
        ));
    }

    #[test]
    fn set_completed_on_missing_reminder_is_not_found() {
        let store = PetStore::open_in_memory().unwrap();
        let err = store.set_completed(ReminderId(404), true).unwrap_err();
        assert!(matches!(err, StoreError::NotFound { what: "reminder", id: 404 }));
    }
}
