use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use sqlx::SqlitePool;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::model::Reminder;
use crate::repo;
use crate::resolver::resolve_trigger;
use crate::time::{local_to_ms, now_local, now_ms};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerConfig {
    /// Poll period. Sub-minute keeps reminders responsive without hammering
    /// the store.
    pub period: Duration,
    /// Catch-up window after the trigger instant. An evaluator coming back
    /// hours late must not replay the day's stale reminders.
    pub catch_up_window: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(30),
            catch_up_window: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickStats {
    pub evaluated: usize,
    pub dispatched: usize,
    pub deduped: usize,
}

/// One evaluation pass over the notifiable tasks.
///
/// An entity is due when `now` sits inside `[trigger, trigger + window)`.
/// Ledger pruning piggybacks on the pass; it never gets its own timer.
pub async fn run_tick(
    pool: &SqlitePool,
    dispatcher: &Dispatcher,
    window: Duration,
    now: NaiveDateTime,
) -> TickStats {
    let mut stats = TickStats::default();
    let todos = match repo::list_notifiable_todos(pool).await {
        Ok(todos) => todos,
        Err(err) => {
            warn!(target: "pacer", event = "tick_fetch_failed", error = %err);
            return stats;
        }
    };

    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::minutes(2));

    for todo in todos {
        stats.evaluated += 1;
        let Some(trigger) = resolve_trigger(&todo, now) else {
            continue;
        };
        if now < trigger || now >= trigger + window {
            continue;
        }
        let trigger_ms = local_to_ms(trigger);
        let id = todo.id.clone();
        match dispatcher.dispatch(&Reminder::Todo(todo), trigger_ms).await {
            Ok(DispatchOutcome::Deduped) => stats.deduped += 1,
            Ok(_) => stats.dispatched += 1,
            Err(err) => {
                warn!(target: "pacer", event = "dispatch_failed", id = %id, error = %err);
            }
        }
    }

    dispatcher.ledger().prune_expired(now_ms()).await;
    stats
}

/// Client-side poll loop with an explicit lifecycle. Owned by whichever
/// context mounts it; there is no process-wide timer state.
pub struct Scheduler {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn start(pool: SqlitePool, dispatcher: Arc<Dispatcher>, config: SchedulerConfig) -> Self {
        let (shutdown, mut rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let stats =
                            run_tick(&pool, &dispatcher, config.catch_up_window, now_local()).await;
                        debug!(
                            target: "pacer",
                            event = "tick",
                            evaluated = stats.evaluated,
                            dispatched = stats.dispatched,
                            deduped = stats.deduped
                        );
                    }
                    changed = rx.changed() => {
                        if changed.is_err() || *rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!(target: "pacer", event = "scheduler_stopped");
        });
        Self { shutdown, handle }
    }

    /// Tear the timer down. No tick runs after this resolves; a tick in
    /// flight finishes first.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(err) = self.handle.await {
            if !err.is_cancelled() {
                warn!(target: "pacer", event = "scheduler_join_failed", error = %err);
            }
        }
    }
}
