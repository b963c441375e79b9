//! Mock storage backend
//!
//! Generates a rolling population of transactions progressing through
//! their lifecycle, one event per second, plus randomized stats. Used for
//! demos and local development without a database (`MOCK_STORE=true`).

use crate::store::{Store, StoreError, SEARCH_LIMIT};
use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::{Mutex, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio::time::{interval, Duration};
use tokio_util::sync::CancellationToken;
use tracing::info;
use types::event::{Event, TxState};
use types::stats::{Stats, StatsRange};

/// Number of transactions progressing concurrently.
const PARALLELISM: usize = 20;

const TAGS: [&str; 8] = ["starknet", "polygon", "", "", "", "", "", ""];

pub struct MockStore {
    events: RwLock<Vec<Event>>,
    stats: Mutex<Stats>,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            events: RwLock::new(Vec::new()),
            stats: Mutex::new(Stats::default()),
        }
    }

    /// Event feeder: emits one lifecycle advancement per second until the
    /// channel closes or shutdown is requested.
    pub async fn run_generator(
        &self,
        events: mpsc::Sender<Event>,
        shutdown: CancellationToken,
    ) -> anyhow::Result<()> {
        info!("starting mock event generator");
        let mut slots: Vec<Event> = Vec::new();
        let mut tick = interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = tick.tick() => {
                    let event = Self::advance(&mut slots);
                    self.events
                        .write()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(event.clone());
                    if events.send(event).await.is_err() {
                        info!("event channel closed, stopping mock generator");
                        return Ok(());
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("stopping mock event generator");
                    return Ok(());
                }
            }
        }
    }

    /// Advance one randomly chosen transaction slot and return the
    /// resulting event. Completed (or empty) slots restart with a fresh
    /// transaction.
    fn advance(slots: &mut Vec<Event>) -> Event {
        let mut rng = rand::thread_rng();
        if slots.len() < PARALLELISM {
            slots.push(Self::fresh_event(&mut rng));
            return slots[slots.len() - 1].clone();
        }

        let i = rng.gen_range(0..PARALLELISM);
        let next = match slots[i].state {
            TxState::Unknown | TxState::Complete => {
                slots[i] = Self::fresh_event(&mut rng);
                return slots[i].clone();
            }
            TxState::Submitted => TxState::Proving,
            TxState::Proving => TxState::Verifying,
            // Several verification rounds before completion.
            TxState::Verifying => {
                if rng.gen_range(0..4) == 0 {
                    TxState::Complete
                } else {
                    TxState::Verifying
                }
            }
        };
        slots[i].state = next;
        slots[i].timestamp = Utc::now();
        slots[i].clone()
    }

    fn fresh_event(rng: &mut impl Rng) -> Event {
        Event {
            state: TxState::Submitted,
            tx_id: uuid::Uuid::now_v7().simple().to_string(),
            prover_id: uuid::Uuid::now_v7().simple().to_string(),
            tag: TAGS[rng.gen_range(0..TAGS.len())].to_string(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MockStore {
    async fn stats(&self, _range: StatsRange) -> Result<Stats, StoreError> {
        let mut rng = rand::thread_rng();
        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        stats.registered_users += rng.gen_range(0..9000);
        stats.proofs_generated += rng.gen_range(0..9000);
        stats.provers_deployed += rng.gen_range(0..9000);
        stats.proofs_verified += rng.gen_range(0..9000);
        stats.registered_users_delta = rng.gen_range(0.0..100.0);
        stats.proofs_generated_delta = rng.gen_range(0.0..100.0);
        stats.provers_deployed_delta = rng.gen_range(0.0..100.0);
        stats.proofs_verified_delta = rng.gen_range(0.0..100.0);
        Ok(*stats)
    }

    async fn search(&self, filter: &str) -> Result<Vec<Event>, StoreError> {
        let events = self.events.read().unwrap_or_else(PoisonError::into_inner);
        Ok(events
            .iter()
            .rev()
            .filter(|e| e.matches(filter))
            .take(SEARCH_LIMIT)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_never_regresses() {
        let mut slots = Vec::new();
        let mut last_states: std::collections::HashMap<String, TxState> =
            std::collections::HashMap::new();

        for _ in 0..500 {
            let event = MockStore::advance(&mut slots);
            if let Some(&previous) = last_states.get(&event.tx_id) {
                assert!(
                    event.state >= previous || previous == TxState::Complete,
                    "unexpected transition {previous:?} -> {:?}",
                    event.state
                );
            }
            last_states.insert(event.tx_id.clone(), event.state);
        }
    }

    #[tokio::test]
    async fn test_search_matches_and_caps() {
        let store = MockStore::new();
        {
            let mut events = store.events.write().unwrap();
            for i in 0..120 {
                events.push(Event {
                    state: TxState::Submitted,
                    tx_id: format!("tx-{i}"),
                    prover_id: "prover".into(),
                    tag: String::new(),
                    timestamp: Utc::now(),
                });
            }
        }

        let all = store.search("tx-").await.unwrap();
        assert_eq!(all.len(), SEARCH_LIMIT);
        // Newest first.
        assert_eq!(all[0].tx_id, "tx-119");

        let one = store.search("tx-7").await.unwrap();
        assert!(one.iter().all(|e| e.tx_id.contains("tx-7")));

        let none = store.search("no-such-tx").await.unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_stats_accumulate() {
        let store = MockStore::new();
        let first = store.stats(StatsRange::Week).await.unwrap();
        let second = store.stats(StatsRange::Week).await.unwrap();
        assert!(second.registered_users >= first.registered_users);
    }
}
