use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::ConnectOptions;
use sqlx::SqlitePool;

use pacer_lib::dispatch::Dispatcher;
use pacer_lib::ledger::DedupLedger;
use pacer_lib::notify::{ConsoleBanner, ConsoleNotifier};
use pacer_lib::push::HttpPushTransport;
use pacer_lib::scheduler::{Scheduler, SchedulerConfig};
use pacer_lib::sweep::{run_sweep, SweepStatus, SweepSummary};
use pacer_lib::{migrate, repo, time};

#[derive(Debug, Parser)]
#[command(name = "pacer", about = "Pacer reminder scheduling service", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one server-side reminder sweep and report what was sent.
    Sweep {
        /// Emit the raw JSON sweep summary instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// Run the client-style poll loop against the local store until
    /// interrupted.
    Watch {
        /// Poll period in seconds.
        #[arg(long, default_value_t = 30)]
        period_secs: u64,
        /// Catch-up window in seconds after a trigger instant.
        #[arg(long, default_value_t = 120)]
        window_secs: u64,
    },
    /// Notification history commands.
    #[command(subcommand)]
    Notifications(NotificationsCommand),
    /// Delete dedup markers older than 24 hours.
    Prune,
}

#[derive(Debug, Subcommand)]
enum NotificationsCommand {
    /// List recent notifications for a user.
    List {
        #[arg(long)]
        user: String,
        #[arg(long, default_value_t = 20)]
        limit: i64,
        /// Emit raw JSON instead of the table view.
        #[arg(long)]
        json: bool,
    },
    /// Mark one notification as read.
    MarkRead {
        #[arg(long)]
        id: String,
    },
}

#[tokio::main]
async fn main() {
    pacer_lib::init_logging();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(command: Commands) -> Result<i32> {
    let db_path = default_db_path().context("determine database path")?;
    let pool = open_pool(&db_path).await?;
    migrate::apply_migrations(&pool)
        .await
        .context("apply database migrations")?;

    let code = match command {
        Commands::Sweep { json } => handle_sweep(&pool, json).await?,
        Commands::Watch {
            period_secs,
            window_secs,
        } => handle_watch(&pool, period_secs, window_secs).await?,
        Commands::Notifications(cmd) => handle_notifications(&pool, cmd).await?,
        Commands::Prune => {
            let ledger = DedupLedger::new(pool.clone());
            let pruned = ledger.prune_expired(time::now_ms()).await;
            println!("Pruned {pruned} expired markers.");
            0
        }
    };

    pool.close().await;
    Ok(code)
}

async fn handle_sweep(pool: &SqlitePool, emit_json: bool) -> Result<i32> {
    let transport = Arc::new(HttpPushTransport::new());
    match run_sweep(pool, transport, time::now_local()).await {
        Ok(summary) => {
            if emit_json {
                let serialized =
                    serde_json::to_string_pretty(&summary).context("serialize sweep summary")?;
                println!("{serialized}");
            } else {
                print_sweep_table(&summary);
            }
            Ok(0)
        }
        Err(err) => {
            if emit_json {
                let payload = serde_json::json!({ "error": err });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                eprintln!("Sweep failed: {err}");
            }
            Ok(1)
        }
    }
}

fn print_sweep_table(summary: &SweepSummary) {
    println!("Reminder sweep report");
    println!("Processed : {}", summary.processed);

    if summary.items.is_empty() {
        println!("\nNothing was due.");
        return;
    }

    println!("\n{:<38} {:<16} Status", "Id", "Kind");
    for item in &summary.items {
        println!(
            "{:<38} {:<16} {}",
            item.id,
            item.kind.as_str(),
            status_label(&item.status)
        );
    }
}

fn status_label(status: &SweepStatus) -> String {
    match status {
        SweepStatus::Sent => "sent".to_string(),
        SweepStatus::Deduped => "deduped".to_string(),
        SweepStatus::SkippedCompleted => "skipped (journal done)".to_string(),
        SweepStatus::Failed { message } => format!("failed: {message}"),
    }
}

async fn handle_watch(pool: &SqlitePool, period_secs: u64, window_secs: u64) -> Result<i32> {
    let ledger = Arc::new(DedupLedger::new(pool.clone()));
    let dispatcher = Arc::new(Dispatcher::local(
        pool.clone(),
        ledger,
        Arc::new(ConsoleNotifier),
        Arc::new(ConsoleBanner),
    ));
    let config = SchedulerConfig {
        period: Duration::from_secs(period_secs),
        catch_up_window: Duration::from_secs(window_secs),
    };

    println!("Watching for due reminders every {period_secs}s. Press Ctrl-C to stop.");
    let scheduler = Scheduler::start(pool.clone(), dispatcher, config);
    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    scheduler.stop().await;
    println!("Stopped.");
    Ok(0)
}

async fn handle_notifications(pool: &SqlitePool, command: NotificationsCommand) -> Result<i32> {
    match command {
        NotificationsCommand::List { user, limit, json } => {
            let records = repo::list_notifications(pool, &user, limit)
                .await
                .context("list notifications")?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
            } else if records.is_empty() {
                println!("No notifications for {user}.");
            } else {
                println!("{:<38} {:<6} {:<13} Title", "Id", "Read", "Created (ms)");
                for record in &records {
                    println!(
                        "{:<38} {:<6} {:<13} {}",
                        record.id,
                        if record.read { "yes" } else { "no" },
                        record.created_at,
                        record.title
                    );
                }
            }
            Ok(0)
        }
        NotificationsCommand::MarkRead { id } => {
            repo::mark_notification_read(pool, &id)
                .await
                .context("mark notification read")?;
            println!("Marked {id} as read.");
            Ok(0)
        }
    }
}

fn default_db_path() -> Result<PathBuf> {
    if let Ok(fake) = std::env::var("PACER_FAKE_APPDATA") {
        return Ok(PathBuf::from(fake).join("pacer.sqlite3"));
    }

    let base = dirs::data_dir()
        .or_else(|| std::env::current_dir().ok())
        .ok_or_else(|| anyhow::anyhow!("failed to resolve application data directory"))?;
    Ok(base.join("com.pacer.app").join("pacer.sqlite3"))
}

async fn open_pool(db_path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create database parent directory {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Full)
        .foreign_keys(true)
        .log_statements(log::LevelFilter::Off);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .with_context(|| format!("open sqlite database at {}", db_path.display()))?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(&pool)
        .await
        .ok();

    Ok(pool)
}
