use chrono::{DateTime, Utc};
use petcare_core::{PetId, ReminderId};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

/// Care activities offered when creating a reminder.
pub const ACTIVITIES: [&str; 6] = ["Feed", "Groom", "Vet", "Wash", "Play", "Medicine"];

/// A persisted pet profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pet {
    pub id: PetId,
    pub name: String,
    pub age_years: u32,
    pub age_months: u32,
    pub breed: String,
    pub color: String,
    pub favorite_food: String,
    /// Path or URI of the pet's photo, if one was attached.
    pub photo_uri: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for [`crate::PetStore::insert_pet`].
///
/// `id: Some(_)` replaces an existing row with that id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPet {
    pub id: Option<PetId>,
    pub name: String,
    pub age_years: u32,
    pub age_months: u32,
    pub breed: String,
    pub color: String,
    pub favorite_food: String,
    pub photo_uri: Option<String>,
}

impl NewPet {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(StoreError::Invalid("pet name must not be blank".to_string()));
        }
        if self.age_months > 11 {
            return Err(StoreError::Invalid(format!(
                "age_months must be 0..=11, got {}",
                self.age_months
            )));
        }
        Ok(())
    }
}

/// A persisted care reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub title: String,
    /// A completed reminder is never scheduled.
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    /// `None` means "fire as soon as scheduled".
    pub due_at: Option<DateTime<Utc>>,
    /// `None`, zero or negative means non-repeating.
    pub repeat_minutes: Option<i64>,
    pub cat_name: Option<String>,
    pub activity: Option<String>,
}

impl Reminder {
    pub fn repeats(&self) -> bool {
        self.repeat_minutes.is_some_and(|m| m > 0)
    }
}

/// Input for [`crate::PetStore::insert_reminder`]. The store assigns the id.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewReminder {
    /// Left blank, the title is built from activity and pet name.
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub repeat_minutes: Option<i64>,
    pub cat_name: Option<String>,
    pub activity: Option<String>,
}

impl NewReminder {
    /// `"Feed – Milo"`, `"Feed"`, `"Milo"` or empty.
    pub fn build_title(activity: Option<&str>, pet: Option<&str>) -> String {
        [activity, pet]
            .into_iter()
            .flatten()
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" – ")
    }

    /// Combine an hours + minutes repeat into total minutes; zero becomes `None`.
    pub fn repeat_from(hours: u32, minutes: u32) -> Option<i64> {
        let total = i64::from(hours) * 60 + i64::from(minutes);
        (total > 0).then_some(total)
    }

    /// Trimmed title, auto-filled when blank. Errors if still blank.
    pub(crate) fn resolved_title(&self) -> Result<String> {
        let title = self.title.trim();
        let title = if title.is_empty() {
            Self::build_title(self.activity.as_deref(), self.cat_name.as_deref())
        } else {
            title.to_string()
        };
        if title.trim().is_empty() {
            return Err(StoreError::Invalid("reminder title must not be blank".to_string()));
        }
        Ok(title)
    }
}
