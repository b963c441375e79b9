//! Postgres storage backend
//!
//! Live events arrive over `LISTEN`/`NOTIFY`: the chain node notifies the
//! `dashboard_data_stream` channel with a JSON event payload for every
//! transaction state change. Stats and search are plain queries over the
//! transaction tables.

use crate::store::{Store, StoreError, SEARCH_LIMIT};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use types::event::{Event, TxState};
use types::stats::{Stats, StatsRange};

/// NOTIFY channel the chain node publishes transaction events on.
pub const NOTIFY_CHANNEL: &str = "dashboard_data_stream";

const STATS_QUERY: &str = r#"
SELECT
    (SELECT COUNT(*) FROM acl_whitelist) AS registered_users,
    (SELECT COUNT(DISTINCT(prover)) FROM deploy) AS provers_deployed,
    (SELECT COUNT(*) FROM transaction WHERE kind = 'proof') AS proofs_generated,
    (SELECT COUNT(*) FROM transaction WHERE kind = 'verification') AS proofs_verified
"#;

// Free-text search straight from the user; matches a transaction hash, the
// program of its first workflow step, or a prover, and derives the current
// lifecycle state from how many proofs/verifications reference it.
const SEARCH_QUERY: &str = r#"
WITH matched AS (
    SELECT DISTINCT t.created_at, t.hash
    FROM transaction AS t
    LEFT JOIN workflow_step AS ws ON ws.tx = t.hash AND ws.sequence = 1
    LEFT JOIN proof AS p ON p.tx = t.hash
    WHERE t.hash = $1 OR ws.program = $1 OR p.prover = $1
    ORDER BY t.created_at DESC
    LIMIT $2
)
SELECT
    CASE
        WHEN (SELECT COUNT(*) FROM proof WHERE parent = m.hash) = 0
            THEN 'submitted'
        WHEN (SELECT COUNT(*) FROM verification AS v
              JOIN proof AS p ON v.parent = p.tx
              WHERE p.parent = m.hash) = 0
            THEN 'proving'
        WHEN (SELECT COUNT(*) FROM verification AS v
              JOIN proof AS p ON v.parent = p.tx
              WHERE p.parent = m.hash) > 2
            THEN 'complete'
        ELSE 'verifying'
    END AS state,
    m.hash AS tx_id,
    COALESCE(ws.program, '') AS prover_id,
    COALESCE(pr.name, '') AS tag,
    m.created_at AS timestamp
FROM matched AS m
LEFT JOIN workflow_step AS ws ON ws.tx = m.hash AND ws.sequence = 1
LEFT JOIN program AS pr ON pr.hash = ws.program
ORDER BY m.created_at DESC
"#;

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(5).connect(dsn).await?;
        Ok(Self { pool })
    }

    /// Event feeder: forwards NOTIFY payloads as [`Event`]s until the
    /// channel closes or shutdown is requested. A malformed payload is
    /// logged and skipped; a broken listener connection is a structural
    /// failure and propagates.
    pub async fn run_listener(
        &self,
        events: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(NOTIFY_CHANNEL).await?;
        info!(channel = NOTIFY_CHANNEL, "listening for transaction notifications");

        loop {
            tokio::select! {
                notification = listener.recv() => {
                    let notification = notification?;
                    debug!(payload = notification.payload(), "received notification");
                    match serde_json::from_str::<Event>(notification.payload()) {
                        Ok(event) => {
                            if events.send(event).await.is_err() {
                                info!("event channel closed, stopping pg listener");
                                return Ok(());
                            }
                        }
                        Err(err) => {
                            error!(error = %err, "malformed notification payload, skipping");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("stopping pg listener");
                    return Ok(());
                }
            }
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn stats(&self, _range: StatsRange) -> Result<Stats, StoreError> {
        // TODO: scope the counts to the requested range and compute the
        // period-over-period deltas once the aggregation tables land.
        let (registered_users, provers_deployed, proofs_generated, proofs_verified) =
            sqlx::query_as::<_, (i64, i64, i64, i64)>(STATS_QUERY)
                .fetch_one(&self.pool)
                .await?;

        Ok(Stats {
            registered_users: registered_users.max(0) as u64,
            provers_deployed: provers_deployed.max(0) as u64,
            proofs_generated: proofs_generated.max(0) as u64,
            proofs_verified: proofs_verified.max(0) as u64,
            ..Stats::default()
        })
    }

    async fn search(&self, filter: &str) -> Result<Vec<Event>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, DateTime<Utc>)>(
            SEARCH_QUERY,
        )
        .bind(filter.trim())
        .bind(SEARCH_LIMIT as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(state, tx_id, prover_id, tag, timestamp)| Event {
                state: TxState::parse(&state),
                tx_id,
                prover_id,
                tag,
                timestamp,
            })
            .collect())
    }
}
