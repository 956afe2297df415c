use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{info, warn};

use crate::model::{PushEndpoint, PushPayload};
use crate::repo;

#[derive(Debug, Error)]
pub enum PushSendError {
    /// The endpoint is permanently gone (expired or unsubscribed) and must
    /// be removed from the registry.
    #[error("endpoint gone (status {0})")]
    Gone(u16),
    #[error("delivery failed (status {0})")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(String),
}

impl PushSendError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, PushSendError::Gone(_))
    }
}

/// Classify an HTTP status from a push service. 404/410 mean the
/// subscription no longer exists.
pub fn classify_status(status: u16) -> Result<(), PushSendError> {
    match status {
        200..=299 => Ok(()),
        404 | 410 => Err(PushSendError::Gone(status)),
        other => Err(PushSendError::Status(other)),
    }
}

/// Delivery boundary for one endpoint. The sweep owns classification of the
/// result; implementations only report what the service said.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn send(
        &self,
        endpoint: &PushEndpoint,
        payload: &PushPayload,
    ) -> Result<(), PushSendError>;
}

/// HTTP transport posting to a push relay. Message encryption is the
/// relay's concern; this core ships the subscription keys alongside the
/// payload.
pub struct HttpPushTransport {
    client: reqwest::Client,
}

impl HttpPushTransport {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpPushTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PushTransport for HttpPushTransport {
    async fn send(
        &self,
        endpoint: &PushEndpoint,
        payload: &PushPayload,
    ) -> Result<(), PushSendError> {
        let body = json!({
            "keys": { "p256dh": endpoint.p256dh, "auth": endpoint.auth },
            "payload": payload,
        });
        let response = self
            .client
            .post(&endpoint.endpoint)
            .header("TTL", "86400")
            .timeout(Duration::from_secs(10))
            .json(&body)
            .send()
            .await
            .map_err(|err| PushSendError::Transport(err.to_string()))?;
        classify_status(response.status().as_u16())
    }
}

/// Recording transport for tests; endpoints can be primed to fail with a
/// given status.
#[derive(Default)]
pub struct MemoryPushTransport {
    sent: Mutex<Vec<(String, PushPayload)>>,
    failures: Mutex<HashMap<String, u16>>,
}

impl MemoryPushTransport {
    pub fn fail_with(&self, endpoint: &str, status: u16) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(endpoint.to_string(), status);
    }

    pub fn sent(&self) -> Vec<(String, PushPayload)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl PushTransport for MemoryPushTransport {
    async fn send(
        &self,
        endpoint: &PushEndpoint,
        payload: &PushPayload,
    ) -> Result<(), PushSendError> {
        let status = self
            .failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&endpoint.endpoint)
            .copied()
            .unwrap_or(201);
        classify_status(status)?;
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((endpoint.endpoint.clone(), payload.clone()));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct FanOutOutcome {
    pub delivered: u32,
    pub pruned: u32,
    pub failed: u32,
}

/// Send the payload to every registered endpoint of the user, sequentially.
///
/// A permanently-gone endpoint is deleted from the registry, the only
/// registration mutation this core performs. Transient failures are logged
/// and left for the next natural occurrence; there is no same-sweep retry.
pub async fn fan_out(
    pool: &SqlitePool,
    transport: &dyn PushTransport,
    user_id: &str,
    payload: &PushPayload,
) -> anyhow::Result<FanOutOutcome> {
    let endpoints = repo::list_push_endpoints(pool, user_id).await?;
    let mut outcome = FanOutOutcome::default();

    for endpoint in endpoints {
        match transport.send(&endpoint, payload).await {
            Ok(()) => {
                outcome.delivered += 1;
            }
            Err(err) if err.is_permanent() => {
                info!(
                    target: "pacer",
                    event = "push_endpoint_pruned",
                    endpoint_id = %endpoint.id,
                    user_id = %user_id,
                    error = %err
                );
                repo::delete_push_endpoint(pool, &endpoint.id).await?;
                outcome.pruned += 1;
            }
            Err(err) => {
                warn!(
                    target: "pacer",
                    event = "push_send_failed",
                    endpoint_id = %endpoint.id,
                    user_id = %user_id,
                    error = %err
                );
                outcome.failed += 1;
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReminderKind;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("connect sqlite::memory:");
        crate::migrate::apply_migrations(&pool)
            .await
            .expect("apply migrations");
        pool
    }

    fn payload() -> PushPayload {
        PushPayload {
            kind: ReminderKind::Todo,
            title: "Stretch".into(),
            body: "This task is due now.".into(),
        }
    }

    #[test]
    fn status_classification() {
        assert!(classify_status(201).is_ok());
        assert!(matches!(classify_status(410), Err(PushSendError::Gone(410))));
        assert!(matches!(classify_status(404), Err(PushSendError::Gone(404))));
        assert!(matches!(
            classify_status(500),
            Err(PushSendError::Status(500))
        ));
    }

    #[tokio::test]
    async fn gone_endpoint_is_pruned_and_skipped_afterwards() -> anyhow::Result<()> {
        let pool = memory_pool().await;
        repo::upsert_push_endpoint(&pool, "u1", "https://push.example/alive", "pk", "ak").await?;
        repo::upsert_push_endpoint(&pool, "u1", "https://push.example/gone", "pk", "ak").await?;

        let transport = MemoryPushTransport::default();
        transport.fail_with("https://push.example/gone", 410);

        let outcome = fan_out(&pool, &transport, "u1", &payload()).await?;
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.pruned, 1);
        assert_eq!(outcome.failed, 0);
        assert_eq!(repo::list_push_endpoints(&pool, "u1").await?.len(), 1);

        // The pruned endpoint is gone from the registry; the next fan-out
        // only touches the live one and reports no errors.
        let outcome = fan_out(&pool, &transport, "u1", &payload()).await?;
        assert_eq!(outcome.delivered, 1);
        assert_eq!(outcome.pruned, 0);
        assert_eq!(transport.sent().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn transient_failure_keeps_the_endpoint() -> anyhow::Result<()> {
        let pool = memory_pool().await;
        repo::upsert_push_endpoint(&pool, "u1", "https://push.example/busy", "pk", "ak").await?;

        let transport = MemoryPushTransport::default();
        transport.fail_with("https://push.example/busy", 503);

        let outcome = fan_out(&pool, &transport, "u1", &payload()).await?;
        assert_eq!(outcome.delivered, 0);
        assert_eq!(outcome.failed, 1);
        assert_eq!(repo::list_push_endpoints(&pool, "u1").await?.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn re_registration_refreshes_keys_in_place() -> anyhow::Result<()> {
        let pool = memory_pool().await;
        let first =
            repo::upsert_push_endpoint(&pool, "u1", "https://push.example/a", "pk1", "ak1").await?;
        let second =
            repo::upsert_push_endpoint(&pool, "u1", "https://push.example/a", "pk2", "ak2").await?;
        assert_eq!(first.id, second.id);
        assert_eq!(second.p256dh, "pk2");
        assert_eq!(repo::list_push_endpoints(&pool, "u1").await?.len(), 1);
        Ok(())
    }
}
