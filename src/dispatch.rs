use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::ledger::{marker_key, DedupLedger};
use crate::model::Reminder;
use crate::notify::{BannerSink, Notifier, Permission};
use crate::push::{fan_out, FanOutOutcome, PushTransport};
use crate::repo;
use crate::time::now_ms;

/// Delivery side of a dispatcher. Client evaluators get the native/banner
/// pair; the server sweep always fans out to push endpoints and never makes
/// a native call.
pub enum Delivery {
    Local {
        notifier: Arc<dyn Notifier>,
        banner: Arc<dyn BannerSink>,
    },
    Push {
        transport: Arc<dyn PushTransport>,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Another evaluator already claimed this occurrence.
    Deduped,
    Native,
    Banner,
    Pushed(FanOutOutcome),
}

pub struct Dispatcher {
    pool: SqlitePool,
    ledger: Arc<DedupLedger>,
    delivery: Delivery,
}

impl Dispatcher {
    pub fn local(
        pool: SqlitePool,
        ledger: Arc<DedupLedger>,
        notifier: Arc<dyn Notifier>,
        banner: Arc<dyn BannerSink>,
    ) -> Self {
        Self {
            pool,
            ledger,
            delivery: Delivery::Local { notifier, banner },
        }
    }

    pub fn push(pool: SqlitePool, ledger: Arc<DedupLedger>, transport: Arc<dyn PushTransport>) -> Self {
        Self {
            pool,
            ledger,
            delivery: Delivery::Push { transport },
        }
    }

    pub fn ledger(&self) -> Arc<DedupLedger> {
        self.ledger.clone()
    }

    /// Deliver one due occurrence.
    ///
    /// The ledger marker is claimed before anything else; a lost claim is a
    /// silent no-op. A durable history row is recorded whatever the delivery
    /// outcome, and a failed delivery never rolls the marker back: the next
    /// occurrence produces a fresh marker naturally.
    pub async fn dispatch(&self, reminder: &Reminder, trigger_ms: i64) -> AppResult<DispatchOutcome> {
        let key = marker_key(reminder.id(), trigger_ms);
        if !self.ledger.try_claim(&key, now_ms()).await {
            return Ok(DispatchOutcome::Deduped);
        }

        let title = reminder.notification_title();
        let body = reminder.notification_body();

        if let Err(err) =
            repo::insert_notification(&self.pool, reminder.user_id(), &title, &body).await
        {
            // The claim stands either way; losing the history row is the
            // lesser failure.
            warn!(
                target: "pacer",
                event = "history_write_failed",
                id = %reminder.id(),
                error = %err
            );
        }

        match &self.delivery {
            Delivery::Local { notifier, banner } => match notifier.request_permission() {
                Permission::Granted => match notifier.show(&title, &body) {
                    Ok(()) => {
                        info!(
                            target: "pacer",
                            event = "reminder_dispatched",
                            channel = "native",
                            id = %reminder.id(),
                            trigger_ms = trigger_ms
                        );
                        Ok(DispatchOutcome::Native)
                    }
                    Err(err) => {
                        warn!(
                            target: "pacer",
                            event = "native_delivery_failed",
                            id = %reminder.id(),
                            error = %err
                        );
                        banner.banner(&title, &body);
                        Ok(DispatchOutcome::Banner)
                    }
                },
                Permission::Denied => {
                    banner.banner(&title, &body);
                    info!(
                        target: "pacer",
                        event = "reminder_dispatched",
                        channel = "banner",
                        id = %reminder.id(),
                        trigger_ms = trigger_ms
                    );
                    Ok(DispatchOutcome::Banner)
                }
            },
            Delivery::Push { transport } => {
                let payload = reminder.payload();
                let outcome = fan_out(&self.pool, transport.as_ref(), reminder.user_id(), &payload)
                    .await
                    .map_err(|err| {
                        AppError::from(err)
                            .with_context("operation", "push_fan_out")
                            .with_context("id", reminder.id().to_string())
                    })?;
                info!(
                    target: "pacer",
                    event = "reminder_dispatched",
                    channel = "push",
                    id = %reminder.id(),
                    delivered = outcome.delivered,
                    pruned = outcome.pruned,
                    failed = outcome.failed
                );
                Ok(DispatchOutcome::Pushed(outcome))
            }
        }
    }
}
