use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::dispatch::{DispatchOutcome, Dispatcher};
use crate::error::{AppError, AppResult};
use crate::ledger::DedupLedger;
use crate::model::{Recurrence, Reminder, ReminderKind};
use crate::push::PushTransport;
use crate::repo;
use crate::resolver::{parse_due_time, resolve_trigger};
use crate::time::{local_to_ms, now_ms};
use crate::util::dispatch_async_app_result;

/// Evening default for prompts with no configured time.
pub fn default_prompt_time() -> NaiveTime {
    NaiveTime::from_hms_opt(20, 0, 0).expect("20:00 is a valid time")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SweepStatus {
    Sent,
    /// Another evaluator claimed the occurrence first.
    Deduped,
    /// Prompt short-circuit: today's journal entry already exists.
    SkippedCompleted,
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepItem {
    pub id: String,
    pub kind: ReminderKind,
    #[serde(flatten)]
    pub status: SweepStatus,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepSummary {
    /// Notifications actually sent this run.
    pub processed: u32,
    pub items: Vec<SweepItem>,
}

/// Stateless server evaluation pass, invoked externally on a fixed cadence.
///
/// Everything is recomputed from durable storage; nothing survives between
/// invocations. Unlike the client loop there is no catch-up window: one-shot
/// tasks are gated by `notification_sent`, recurring occurrences by their
/// ledger marker, prompts by `notified_on`. Flags committed before a failure
/// stay committed; the next run resumes from durable state.
pub async fn run_sweep(
    pool: &SqlitePool,
    transport: Arc<dyn PushTransport>,
    now: NaiveDateTime,
) -> AppResult<SweepSummary> {
    let ledger = Arc::new(DedupLedger::new(pool.clone()));
    ledger.prune_expired(now_ms()).await;
    let dispatcher = Dispatcher::push(pool.clone(), ledger, transport);

    let mut summary = SweepSummary::default();

    let todos = repo::list_notifiable_todos(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "sweep_fetch_tasks"))?;

    for todo in todos {
        if todo.recurrence == Recurrence::None && todo.notification_sent {
            continue;
        }
        let Some(trigger) = resolve_trigger(&todo, now) else {
            continue;
        };
        if now < trigger {
            continue;
        }

        let id = todo.id.clone();
        let one_shot = todo.recurrence == Recurrence::None;
        let result = dispatch_async_app_result(|| async {
            if one_shot {
                // Flag before send; the one-shot gate must survive marker
                // pruning and sweep gaps.
                repo::mark_notification_sent(pool, &todo.id)
                    .await
                    .map_err(AppError::from)?;
            }
            let trigger_ms = local_to_ms(trigger);
            dispatcher.dispatch(&Reminder::Todo(todo), trigger_ms).await
        })
        .await;

        let status = match result {
            Ok(DispatchOutcome::Deduped) => SweepStatus::Deduped,
            Ok(_) => {
                summary.processed += 1;
                SweepStatus::Sent
            }
            Err(err) => {
                warn!(
                    target: "pacer",
                    event = "sweep_item_failed",
                    id = %id,
                    error = %err
                );
                SweepStatus::Failed {
                    message: err.to_string(),
                }
            }
        };
        summary.items.push(SweepItem {
            id,
            kind: ReminderKind::Todo,
            status,
        });
    }

    let today = now.date().format("%Y-%m-%d").to_string();
    let prompts = repo::list_enabled_prompts(pool)
        .await
        .map_err(|err| AppError::from(err).with_context("operation", "sweep_fetch_prompts"))?;

    for prompt in prompts {
        if prompt.notified_on.as_deref() == Some(today.as_str()) {
            continue;
        }
        let prompt_time = match prompt.prompt_time.as_deref() {
            // Malformed times fail closed, like task due times.
            Some(raw) => match parse_due_time(raw) {
                Some(time) => time,
                None => continue,
            },
            None => default_prompt_time(),
        };
        let trigger = now.date().and_time(prompt_time);
        if now < trigger {
            continue;
        }

        let id = prompt.id.clone();
        let user_id = prompt.user_id.clone();
        let result = dispatch_async_app_result(|| async {
            let completed_today = repo::has_entry_for(pool, &user_id, &today)
                .await
                .map_err(AppError::from)?;
            // Set the day flag either way so the next sweep stops
            // re-checking this prompt until tomorrow.
            repo::set_prompt_notified_on(pool, &prompt.id, &today)
                .await
                .map_err(AppError::from)?;
            if completed_today {
                return Ok(SweepStatus::SkippedCompleted);
            }
            let trigger_ms = local_to_ms(trigger);
            match dispatcher
                .dispatch(&Reminder::MindsetPrompt(prompt), trigger_ms)
                .await?
            {
                DispatchOutcome::Deduped => Ok(SweepStatus::Deduped),
                _ => Ok(SweepStatus::Sent),
            }
        })
        .await;

        let status = match result {
            Ok(SweepStatus::Sent) => {
                summary.processed += 1;
                SweepStatus::Sent
            }
            Ok(status) => status,
            Err(err) => {
                warn!(
                    target: "pacer",
                    event = "sweep_item_failed",
                    id = %id,
                    error = %err
                );
                SweepStatus::Failed {
                    message: err.to_string(),
                }
            }
        };
        summary.items.push(SweepItem {
            id,
            kind: ReminderKind::MindsetPrompt,
            status,
        });
    }

    info!(
        target: "pacer",
        event = "sweep_complete",
        processed = summary.processed,
        items = summary.items.len()
    );
    Ok(summary)
}
