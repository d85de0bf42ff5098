use chrono::{Duration, Utc};
use petcare::PetCare;
use petcare_core::config::{PetcareConfig, TIMER_TAG};
use petcare_core::{PetId, PetcareError, ReminderId, TimerName, TimerPayload};
use petcare_scheduler::types::TimerSpec;
use petcare_scheduler::NotificationEvent;
use petcare_store::{NewPet, NewReminder};

fn open(dir: &tempfile::TempDir) -> PetCare {
    let mut config = PetcareConfig::default();
    config.database.path = dir.path().join("petcare.db").to_string_lossy().into_owned();
    PetCare::open(config).unwrap()
}

fn feed(pet: &str, repeat_minutes: Option<i64>) -> NewReminder {
    NewReminder {
        title: String::new(),
        due_at: Some(Utc::now() + Duration::hours(1)),
        repeat_minutes,
        cat_name: Some(pet.to_string()),
        activity: Some("Feed".to_string()),
    }
}

#[tokio::test]
async fn add_reminder_installs_one_timer() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    app.add_pet(NewPet::named("Milo")).unwrap();

    let (reminder, fire_at) = app.add_reminder(feed("Milo", Some(480))).await.unwrap();
    assert_eq!(reminder.title, "Feed – Milo");

    let timer = app.reminder_timer(reminder.id).await.unwrap().unwrap();
    assert_eq!(Some(timer.fire_at), fire_at);
    assert_eq!(timer.tag, TIMER_TAG);
    assert_eq!(app.scheduler().backend().list().await.unwrap().len(), 1);
}

#[tokio::test]
async fn reminder_for_unknown_pet_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);

    let err = app.add_reminder(feed("Ghost", None)).await.unwrap_err();
    assert!(matches!(err, PetcareError::PetNotFound { .. }));
    assert!(app.list_reminders().unwrap().is_empty());
    assert!(app.scheduler().backend().list().await.unwrap().is_empty());
}

#[tokio::test]
async fn deleting_pet_cancels_and_removes_its_reminders() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    let milo = app.add_pet(NewPet::named("Milo")).unwrap();
    app.add_pet(NewPet::named("Luna")).unwrap();

    let (a, _) = app.add_reminder(feed("Milo", Some(60))).await.unwrap();
    let (b, _) = app.add_reminder(feed("Milo", None)).await.unwrap();
    let (luna, _) = app.add_reminder(feed("Luna", Some(30))).await.unwrap();

    let mut removed = app.delete_pet(milo.id).await.unwrap();
    removed.sort_by_key(|id| id.get());
    assert_eq!(removed, vec![a.id, b.id]);

    assert!(app.pet(milo.id).unwrap().is_none());
    assert!(app.reminder_timer(a.id).await.unwrap().is_none());
    assert!(app.reminder_timer(b.id).await.unwrap().is_none());

    let remaining = app.list_reminders().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, luna.id);
    assert!(app.reminder_timer(luna.id).await.unwrap().is_some());
}

#[tokio::test]
async fn deleting_missing_pet_reports_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    let err = app.delete_pet(PetId(404)).await.unwrap_err();
    assert!(matches!(err, PetcareError::PetNotFound { .. }));
}

#[tokio::test]
async fn completing_cancels_and_reopening_reschedules() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    app.add_pet(NewPet::named("Milo")).unwrap();
    let (r, _) = app.add_reminder(feed("Milo", Some(120))).await.unwrap();

    app.set_completed(r.id, true).await.unwrap();
    assert!(app.reminder_timer(r.id).await.unwrap().is_none());
    assert!(app.list_reminders().unwrap()[0].completed);

    app.set_completed(r.id, false).await.unwrap();
    assert!(app.reminder_timer(r.id).await.unwrap().is_some());
    assert!(!app.list_reminders().unwrap()[0].completed);
}

#[tokio::test]
async fn completing_unknown_reminder_fails() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    let err = app.set_completed(ReminderId(99), false).await.unwrap_err();
    assert_eq!(err.code(), "REMINDER_NOT_FOUND");
}

#[tokio::test]
async fn delete_reminder_removes_timer_and_row() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    app.add_pet(NewPet::named("Milo")).unwrap();
    let (r, _) = app.add_reminder(feed("Milo", None)).await.unwrap();

    app.delete_reminder(r.id).await.unwrap();
    assert!(app.reminder_timer(r.id).await.unwrap().is_none());
    assert!(app.list_reminders().unwrap().is_empty());

    // Second delete is harmless.
    app.delete_reminder(r.id).await.unwrap();
}

#[tokio::test]
async fn startup_purges_legacy_timers_and_reconciles() {
    let dir = tempfile::tempdir().unwrap();
    {
        let app = open(&dir);
        app.add_pet(NewPet::named("Milo")).unwrap();
        let (r, _) = app.add_reminder(feed("Milo", Some(60))).await.unwrap();

        // A stray timer from an older scheme, plus the reminder's own timer lost.
        app.scheduler()
            .backend()
            .install_unique(TimerSpec {
                name: TimerName::from("petcare-reminder-7"),
                reminder_id: ReminderId(7),
                fire_at: Utc::now(),
                payload: TimerPayload::new(ReminderId(7), "old", String::new(), None),
                tag: "legacy".to_string(),
            })
            .await
            .unwrap();
        app.scheduler()
            .backend()
            .cancel_by_name(&TimerName::for_reminder(r.id))
            .await
            .unwrap();
    }

    let app = open(&dir);
    let report = app.startup().await.unwrap();
    assert_eq!(report.scheduled, 1);
    assert_eq!(report.failed, 0);

    let timers = app.scheduler().backend().list().await.unwrap();
    assert_eq!(timers.len(), 1);
    assert_eq!(timers[0].tag, TIMER_TAG);
    assert!(app
        .notifications()
        .has_channel(&app.config.notifications.channel_id));
}

#[tokio::test]
async fn engine_tick_posts_due_reminder() {
    let dir = tempfile::tempdir().unwrap();
    let app = open(&dir);
    app.add_pet(NewPet::named("Milo")).unwrap();
    let mut events = app.notifications().subscribe();

    let mut overdue = feed("Milo", None);
    overdue.due_at = Some(Utc::now() - Duration::minutes(5));
    let (r, _) = app.add_reminder(overdue).await.unwrap();
    app.startup().await.unwrap();

    let report = app.engine().tick(Utc::now()).await.unwrap();
    assert_eq!(report.fired, 1);

    match events.recv().await.unwrap() {
        NotificationEvent::Posted(n) => {
            assert_eq!(n.reminder_id, r.id);
            assert_eq!(n.title, "Feed – Milo");
        }
        other => panic!("unexpected event {other:?}"),
    }
    // One-shot: consumed after firing.
    assert!(app.reminder_timer(r.id).await.unwrap().is_none());
}

#[tokio::test]
async fn daemon_withdraws_notifications_changed_from_another_process() {
    let dir = tempfile::tempdir().unwrap();
    let daemon = open(&dir);
    daemon.add_pet(NewPet::named("Milo")).unwrap();

    let mut due_now = feed("Milo", None);
    due_now.due_at = Some(Utc::now() - Duration::minutes(1));
    let (deleted, _) = daemon.add_reminder(due_now.clone()).await.unwrap();
    let (completed, _) = daemon.add_reminder(due_now.clone()).await.unwrap();
    let (kept, _) = daemon.add_reminder(due_now).await.unwrap();
    daemon.startup().await.unwrap();
    assert_eq!(daemon.engine().tick(Utc::now()).await.unwrap().fired, 3);
    assert_eq!(daemon.notifications().visible_count(), 3);

    // A second handle on the same database stands in for the CLI.
    let cli = open(&dir);
    cli.delete_reminder(deleted.id).await.unwrap();
    cli.set_completed(completed.id, true).await.unwrap();
    assert_eq!(daemon.notifications().visible_count(), 3);

    assert_eq!(daemon.dismiss_stale().await.unwrap(), 2);
    assert_eq!(daemon.notifications().visible_ids(), vec![kept.id]);
    assert_eq!(daemon.dismiss_stale().await.unwrap(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_reminder_adds_all_land() {
    let dir = tempfile::tempdir().unwrap();
    let app = std::sync::Arc::new(open(&dir));
    app.add_pet(NewPet::named("Milo")).unwrap();

    let mut tasks = tokio::task::JoinSet::new();
    for _ in 0..8 {
        let app = std::sync::Arc::clone(&app);
        tasks.spawn(async move { app.add_reminder(feed("Milo", Some(30))).await });
    }
    while let Some(done) = tasks.join_next().await {
        done.unwrap().unwrap();
    }

    assert_eq!(app.list_reminders().unwrap().len(), 8);
    assert_eq!(app.scheduler().backend().list().await.unwrap().len(), 8);
}
