//! In-memory stats cache
//!
//! Stats queries are too heavy to run per request, so a background task
//! refreshes every supported range on an interval and reads are served
//! from memory without touching the database.

use crate::store::Store;
use crate::store::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use types::stats::{Stats, StatsRange};

pub struct StatsCache {
    store: Arc<dyn Store>,
    refresh_interval: Duration,
    stats: RwLock<HashMap<StatsRange, Stats>>,
}

impl StatsCache {
    pub fn new(store: Arc<dyn Store>, refresh_interval: Duration) -> Self {
        Self {
            store,
            refresh_interval,
            stats: RwLock::new(HashMap::new()),
        }
    }

    /// Query the store for every supported range and swap in the result.
    /// Called once at startup (where a failure is fatal) and then
    /// periodically by [`run`](Self::run) (where a failure keeps the
    /// previous snapshot).
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let mut fresh = HashMap::with_capacity(StatsRange::ALL.len());
        for range in StatsRange::ALL {
            fresh.insert(range, self.store.stats(range).await?);
        }
        *self
            .stats
            .write()
            .unwrap_or_else(PoisonError::into_inner) = fresh;
        info!("stats cache updated");
        Ok(())
    }

    /// Last refreshed stats for `range`; zeroes before the first refresh.
    pub fn cached(&self, range: StatsRange) -> Stats {
        self.stats
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&range)
            .copied()
            .unwrap_or_default()
    }

    /// Periodic refresh loop; runs until the shutdown token fires.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(interval = ?self.refresh_interval, "starting stats cache");
        let mut tick = interval(self.refresh_interval);
        tick.tick().await; // the first tick completes immediately
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(err) = self.refresh().await {
                        error!(error = %err, "stats cache refresh failed");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("stopping stats cache");
                    return Ok(());
                }
            }
        }
    }
}
