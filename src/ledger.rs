use std::collections::HashMap;
use std::sync::Mutex;

use sqlx::SqlitePool;
use tracing::{debug, warn};

/// Durable markers older than this are pruned lazily on each poll pass.
pub const MARKER_TTL_MS: i64 = 24 * 60 * 60 * 1000;

/// Ledger key for one occurrence of one entity.
pub fn marker_key(entity_id: &str, trigger_ms: i64) -> String {
    format!("{entity_id}:{trigger_ms}")
}

/// Two-tier dispatch ledger.
///
/// The ephemeral tier is a per-process map and covers repeated ticks within
/// one evaluator lifetime. The durable tier is the shared `sent_markers`
/// table and covers concurrent evaluators; the marker row is written before
/// the send is attempted, so the duplicate window is only as wide as the
/// gap between two evaluators racing the same insert. There is no true
/// cross-process lock here on purpose; the insert that sticks wins.
pub struct DedupLedger {
    pool: SqlitePool,
    seen: Mutex<HashMap<String, i64>>,
}

impl DedupLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Claim the key. Returns true exactly once per distinct live key across
    /// this process; the durable tier extends that to other evaluators on a
    /// best-effort basis. Claims are never rolled back.
    pub async fn try_claim(&self, key: &str, now_ms: i64) -> bool {
        {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            if seen.contains_key(key) {
                return false;
            }
            seen.insert(key.to_string(), now_ms);
        }

        let written = sqlx::query(
            "INSERT INTO sent_markers (marker_key, created_at) VALUES (?, ?) \
             ON CONFLICT(marker_key) DO NOTHING",
        )
        .bind(key)
        .bind(now_ms)
        .execute(&self.pool)
        .await;

        match written {
            Ok(res) => res.rows_affected() > 0,
            Err(err) => {
                // Degraded, not fatal: the ephemeral claim still prevents
                // duplicates within this process for this occurrence.
                warn!(
                    target: "pacer",
                    event = "marker_write_failed",
                    marker_key = %key,
                    error = %err
                );
                true
            }
        }
    }

    /// Drop markers older than [`MARKER_TTL_MS`] from both tiers. Invoked
    /// opportunistically from poll passes, never on its own timer.
    pub async fn prune_expired(&self, now_ms: i64) -> u64 {
        let cutoff = now_ms - MARKER_TTL_MS;
        {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            seen.retain(|_, claimed_at| *claimed_at >= cutoff);
        }

        match sqlx::query("DELETE FROM sent_markers WHERE created_at < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await
        {
            Ok(res) => {
                let pruned = res.rows_affected();
                if pruned > 0 {
                    debug!(target: "pacer", event = "markers_pruned", count = pruned);
                }
                pruned
            }
            Err(err) => {
                warn!(target: "pacer", event = "marker_prune_failed", error = %err);
                0
            }
        }
    }
}
