use chrono::{Duration, Utc};
use petcare_store::{NewPet, NewReminder, PetStore};
use rusqlite::Connection;

fn reminder_for(pet: &str, title: &str) -> NewReminder {
    NewReminder {
        title: title.to_string(),
        due_at: Some(Utc::now() + Duration::minutes(10)),
        repeat_minutes: None,
        cat_name: Some(pet.to_string()),
        activity: Some("Feed".to_string()),
    }
}

#[test]
fn pets_listed_newest_first() {
    let store = PetStore::open_in_memory().unwrap();
    store.insert_pet(NewPet::named("Milo")).unwrap();
    store.insert_pet(NewPet::named("Luna")).unwrap();

    let names: Vec<_> = store.list_pets().unwrap().into_iter().map(|p| p.name).collect();
    assert_eq!(names, vec!["Luna", "Milo"]);
}

#[test]
fn find_pet_by_name_and_id() {
    let store = PetStore::open_in_memory().unwrap();
    let luna = store.insert_pet(NewPet::named("Luna")).unwrap();

    assert_eq!(store.find_pet_by_name("Luna").unwrap().unwrap().id, luna.id);
    assert!(store.find_pet_by_name("Nobody").unwrap().is_none());
    assert_eq!(store.get_pet(luna.id).unwrap().unwrap().name, "Luna");
}

#[test]
fn reminder_round_trips_through_store() {
    let store = PetStore::open_in_memory().unwrap();
    let due = Utc::now() + Duration::hours(2);
    let inserted = store
        .insert_reminder(NewReminder {
            title: String::new(),
            due_at: Some(due),
            repeat_minutes: Some(90),
            cat_name: Some("Milo".to_string()),
            activity: Some("Groom".to_string()),
        })
        .unwrap();

    let loaded = store.get_reminder(inserted.id).unwrap().unwrap();
    assert_eq!(loaded.title, "Groom – Milo");
    assert_eq!(loaded.repeat_minutes, Some(90));
    assert_eq!(
        loaded.due_at.map(|d| d.timestamp_millis()),
        Some(due.timestamp_millis())
    );
    assert!(!loaded.completed);
    assert!(loaded.repeats());
}

#[test]
fn list_pending_excludes_completed() {
    let store = PetStore::open_in_memory().unwrap();
    let a = store.insert_reminder(reminder_for("Milo", "Feed")).unwrap();
    let b = store.insert_reminder(reminder_for("Milo", "Groom")).unwrap();
    store.set_completed(a.id, true).unwrap();

    let pending: Vec<_> = store.list_pending().unwrap().into_iter().map(|r| r.id).collect();
    assert_eq!(pending, vec![b.id]);

    // Completed reminders sort after open ones.
    let all = store.list_reminders().unwrap();
    assert_eq!(all.len(), 2);
    assert!(!all[0].completed);
    assert!(all[1].completed);
}

#[test]
fn reminder_ids_for_pet_matches_by_name() {
    let store = PetStore::open_in_memory().unwrap();
    let a = store.insert_reminder(reminder_for("Milo", "Feed")).unwrap();
    store.insert_reminder(reminder_for("Luna", "Feed")).unwrap();
    let c = store.insert_reminder(reminder_for("Milo", "Vet")).unwrap();

    assert_eq!(store.reminder_ids_for_pet("Milo").unwrap(), vec![a.id, c.id]);
    assert!(store.reminder_ids_for_pet("Ghost").unwrap().is_empty());
}

#[test]
fn delete_reminder_is_idempotent() {
    let store = PetStore::open_in_memory().unwrap();
    let r = store.insert_reminder(reminder_for("Milo", "Feed")).unwrap();
    store.delete_reminder(r.id).unwrap();
    store.delete_reminder(r.id).unwrap();
    assert!(store.get_reminder(r.id).unwrap().is_none());
}

#[test]
fn data_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("petcare.db");

    let id = {
        let store = PetStore::new(Connection::open(&path).unwrap()).unwrap();
        store.insert_pet(NewPet::named("Milo")).unwrap();
        store.insert_reminder(reminder_for("Milo", "Feed")).unwrap().id
    };

    let store = PetStore::new(Connection::open(&path).unwrap()).unwrap();
    assert_eq!(store.list_pets().unwrap().len(), 1);
    assert!(store.get_reminder(id).unwrap().is_some());
}
