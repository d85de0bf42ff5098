use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use clap::builder::PossibleValuesParser;
use clap::{Args, Parser, Subcommand};
use petcare::PetCare;
use petcare_core::config::PetcareConfig;
use petcare_core::reminder::{due_text, format_repeat};
use petcare_core::{PetId, ReminderId};
use petcare_scheduler::NotificationEvent;
use petcare_store::types::ACTIVITIES;
use petcare_store::{NewPet, NewReminder};
use tracing::info;

/// Input format for `--due`, in local time.
const DUE_INPUT_FORMAT: &str = "%Y-%m-%d %H:%M";

#[derive(Parser)]
#[command(name = "petcare", version, about = "Pet profiles and recurring care reminders")]
struct Cli {
    /// Config file (default: $PETCARE_CONFIG or ~/.petcare/petcare.toml).
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Manage pets.
    #[command(subcommand)]
    Pet(PetCommand),
    /// Manage reminders.
    #[command(subcommand)]
    Reminder(ReminderCommand),
    /// Run the reminder daemon until Ctrl-C.
    Run,
}

#[derive(Subcommand)]
enum PetCommand {
    Add(PetArgs),
    List,
    /// Delete a pet together with all of its reminders.
    Remove { id: i64 },
}

#[derive(Args)]
struct PetArgs {
    name: String,
    #[arg(long, default_value_t = 0)]
    age_years: u32,
    #[arg(long, default_value_t = 0)]
    age_months: u32,
    #[arg(long, default_value = "")]
    breed: String,
    #[arg(long, default_value = "")]
    color: String,
    #[arg(long, default_value = "")]
    food: String,
    #[arg(long)]
    photo: Option<String>,
}

#[derive(Subcommand)]
enum ReminderCommand {
    Add(ReminderArgs),
    List,
    Remove { id: i64 },
    /// Mark a reminder done (or open again with --undo).
    Done {
        id: i64,
        #[arg(long)]
        undo: bool,
    },
}

#[derive(Args)]
struct ReminderArgs {
    /// Pet the reminder belongs to.
    #[arg(long)]
    pet: String,
    /// Care activity.
    #[arg(long, value_parser = PossibleValuesParser::new(ACTIVITIES))]
    activity: Option<String>,
    /// Defaults to "<activity> – <pet>".
    #[arg(long)]
    title: Option<String>,
    /// Local due time, `YYYY-MM-DD HH:MM`. Defaults to now.
    #[arg(long)]
    due: Option<String>,
    #[arg(long, default_value_t = 0)]
    every_hours: u32,
    #[arg(long, default_value_t = 0)]
    every_minutes: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petcare=info,petcare_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();

    // load config: --config > PETCARE_CONFIG env > ~/.petcare/petcare.toml
    let config_path = cli.config.clone().or_else(|| std::env::var("PETCARE_CONFIG").ok());
    let config = PetcareConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        PetcareConfig::default()
    });

    let app = PetCare::open(config)?;

    match cli.command {
        Command::Pet(cmd) => run_pet(&app, cmd).await?,
        Command::Reminder(cmd) => run_reminder(&app, cmd).await?,
        Command::Run => run_daemon(&app).await?,
    }
    Ok(())
}

async fn run_pet(app: &PetCare, cmd: PetCommand) -> anyhow::Result<()> {
    match cmd {
        PetCommand::Add(args) => {
            let pet = app.add_pet(NewPet {
                id: None,
                name: args.name,
                age_years: args.age_years,
                age_months: args.age_months,
                breed: args.breed,
                color: args.color,
                favorite_food: args.food,
                photo_uri: args.photo,
            })?;
            println!("Added pet #{} {}", pet.id, pet.name);
        }
        PetCommand::List => {
            let pets = app.list_pets()?;
            if pets.is_empty() {
                println!("No pets yet.");
            }
            for pet in pets {
                println!(
                    "#{:<4} {:<16} {}y {}m  {} {}  likes {}",
                    pet.id,
                    pet.name,
                    pet.age_years,
                    pet.age_months,
                    pet.color,
                    pet.breed,
                    if pet.favorite_food.is_empty() { "-" } else { pet.favorite_food.as_str() },
                );
            }
        }
        PetCommand::Remove { id } => {
            let removed = app.delete_pet(PetId(id)).await?;
            println!("Deleted pet #{id} and {} reminder(s)", removed.len());
        }
    }
    Ok(())
}

async fn run_reminder(app: &PetCare, cmd: ReminderCommand) -> anyhow::Result<()> {
    match cmd {
        ReminderCommand::Add(args) => {
            let due_at = match args.due.as_deref() {
                Some(raw) => parse_local_due(raw)?,
                None => Utc::now(),
            };
            let (reminder, fire_at) = app
                .add_reminder(NewReminder {
                    title: args.title.unwrap_or_default(),
                    due_at: Some(due_at),
                    repeat_minutes: NewReminder::repeat_from(args.every_hours, args.every_minutes),
                    cat_name: Some(args.pet),
                    activity: args.activity,
                })
                .await?;
            println!(
                "Reminder #{} \"{}\" fires {}",
                reminder.id,
                reminder.title,
                due_text(fire_at)
            );
        }
        ReminderCommand::List => {
            let reminders = app.list_reminders()?;
            if reminders.is_empty() {
                println!("No reminders.");
            }
            for r in reminders {
                let mark = if r.completed { "x" } else { " " };
                let repeat = if r.repeats() {
                    format!("  repeats every {}", format_repeat(r.repeat_minutes.unwrap_or_default()))
                } else {
                    String::new()
                };
                println!("[{mark}] #{:<4} {:<28} {}{repeat}", r.id, r.title, due_text(r.due_at));
            }
        }
        ReminderCommand::Remove { id } => {
            app.delete_reminder(ReminderId(id)).await?;
            println!("Deleted reminder #{id}");
        }
        ReminderCommand::Done { id, undo } => {
            app.set_completed(ReminderId(id), !undo).await?;
            println!("Reminder #{id} {}", if undo { "reopened" } else { "done" });
        }
    }
    Ok(())
}

/// Startup reconciliation, then fire timers until Ctrl-C.
async fn run_daemon(app: &PetCare) -> anyhow::Result<()> {
    let report = app.startup().await?;
    info!(
        scheduled = report.scheduled,
        failed = report.failed,
        "startup reconciliation complete"
    );

    // Print every notification the scheduler posts.
    let mut events = app.notifications().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(NotificationEvent::Posted(n)) => println!("🔔 {} — {}", n.title, n.body),
                Ok(NotificationEvent::Dismissed(_)) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(missed = n, "notification printer lagged");
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let engine = tokio::spawn(app.engine().run(shutdown_rx));
    info!("PetCare reminder daemon running, Ctrl-C to stop");

    // Reminders deleted or completed from the CLI lose their notification here.
    let period = std::time::Duration::from_millis(app.config.scheduler.poll_interval_ms.max(1));
    let mut sweep = tokio::time::interval(period);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            stopped = &mut ctrl_c => {
                stopped?;
                break;
            }
            _ = sweep.tick() => {
                if let Err(e) = app.dismiss_stale().await {
                    tracing::warn!("stale notification sweep failed: {e}");
                }
            }
        }
    }
    let _ = shutdown_tx.send(true);
    engine.await?;
    Ok(())
}

fn parse_local_due(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw.trim(), DUE_INPUT_FORMAT)
        .map_err(|e| anyhow::anyhow!("invalid --due '{raw}' (expected {DUE_INPUT_FORMAT}): {e}"))?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .ok_or_else(|| anyhow::anyhow!("--due '{raw}' does not exist in the local timezone"))?;
    Ok(local.with_timezone(&Utc))
}
