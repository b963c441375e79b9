//! Catch-up buffer for new subscribers
//!
//! Fixed-capacity ring holding the most recent rendered frame per distinct
//! transaction, so a freshly connected client sees recent history without a
//! full replay. Repeated updates to the same transaction collapse into its
//! latest known state; when the ring is full, the oldest distinct
//! transaction is evicted to make room for a new one.

use bytes::Bytes;
use std::collections::HashMap;
use types::event::{Event, TxState};

#[derive(Debug, Clone)]
struct Slot {
    tx_id: String,
    frame: Bytes,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    state: TxState,
    index: usize,
}

/// Ring of rendered frames, one slot per distinct `tx_id`.
///
/// The write cursor advances only when a brand-new transaction claims a
/// slot. In-place updates of an existing transaction leave the cursor and
/// the eviction order untouched.
#[derive(Debug)]
pub struct EventBuffer {
    head: Vec<Option<Slot>>,
    head_map: HashMap<String, Entry>,
    head_index: usize,
}

impl EventBuffer {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "event buffer capacity must be positive");
        Self {
            head: vec![None; capacity],
            head_map: HashMap::with_capacity(capacity),
            head_index: 0,
        }
    }

    /// Record the rendered frame for `event`.
    ///
    /// A new transaction claims the slot under the cursor, evicting whatever
    /// occupied it. A known transaction is updated in place, unless the new
    /// state is a regression of the buffered one, in which case the event is
    /// dropped silently.
    pub fn add(&mut self, event: &Event, frame: Bytes) {
        match self.head_map.get(&event.tx_id).copied() {
            None => {
                if let Some(evicted) = self.head[self.head_index].take() {
                    self.head_map.remove(&evicted.tx_id);
                }
                self.head[self.head_index] = Some(Slot {
                    tx_id: event.tx_id.clone(),
                    frame,
                });
                self.head_map.insert(
                    event.tx_id.clone(),
                    Entry {
                        state: event.state,
                        index: self.head_index,
                    },
                );
                self.head_index = (self.head_index + 1) % self.head.len();
            }
            Some(old) => {
                if event.state < old.state {
                    return;
                }
                self.head[old.index] = Some(Slot {
                    tx_id: event.tx_id.clone(),
                    frame,
                });
                self.head_map.insert(
                    event.tx_id.clone(),
                    Entry {
                        state: event.state,
                        index: old.index,
                    },
                );
            }
        }
    }

    /// Occupied frames, oldest insertion first.
    ///
    /// Returns a private copy so the caller can push frames into a channel
    /// without holding the broadcaster lock across the sends.
    pub fn snapshot(&self) -> Vec<Bytes> {
        let len = self.head.len();
        (0..len)
            .filter_map(|i| self.head[(self.head_index + i) % len].as_ref())
            .map(|slot| slot.frame.clone())
            .collect()
    }

    /// Number of distinct transactions currently buffered.
    pub fn len(&self) -> usize {
        self.head_map.len()
    }

    #[cfg(test)]
    fn state_of(&self, tx_id: &str) -> Option<TxState> {
        self.head_map.get(tx_id).map(|e| e.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use proptest::prelude::*;

    fn event(tx_id: &str, state: TxState) -> Event {
        Event {
            state,
            tx_id: tx_id.to_string(),
            prover_id: format!("prover-{tx_id}"),
            tag: String::new(),
            timestamp: Utc::now(),
        }
    }

    fn frame(tx_id: &str, state: TxState) -> Bytes {
        Bytes::from(format!("event: tx-row\ndata: {tx_id}:{state}\n\n"))
    }

    fn add(buf: &mut EventBuffer, tx_id: &str, state: TxState) {
        buf.add(&event(tx_id, state), frame(tx_id, state));
    }

    #[test]
    fn test_distinct_keys_bounded_by_capacity() {
        let mut buf = EventBuffer::new(3);
        for i in 0..10 {
            add(&mut buf, &format!("tx-{i}"), TxState::Submitted);
        }

        assert_eq!(buf.len(), 3);
        let frames = buf.snapshot();
        assert_eq!(frames.len(), 3);
        // The three most recently inserted keys survive, oldest first.
        assert_eq!(frames[0], frame("tx-7", TxState::Submitted));
        assert_eq!(frames[1], frame("tx-8", TxState::Submitted));
        assert_eq!(frames[2], frame("tx-9", TxState::Submitted));
    }

    #[test]
    fn test_same_key_collapses_to_latest_state() {
        let mut buf = EventBuffer::new(4);
        add(&mut buf, "tx-1", TxState::Submitted);
        add(&mut buf, "tx-1", TxState::Proving);
        add(&mut buf, "tx-1", TxState::Verifying);
        add(&mut buf, "tx-1", TxState::Complete);

        assert_eq!(buf.len(), 1);
        let frames = buf.snapshot();
        assert_eq!(frames, vec![frame("tx-1", TxState::Complete)]);
    }

    #[test]
    fn test_regression_is_dropped() {
        let mut buf = EventBuffer::new(4);
        add(&mut buf, "tx-1", TxState::Verifying);
        add(&mut buf, "tx-1", TxState::Proving);

        assert_eq!(buf.state_of("tx-1"), Some(TxState::Verifying));
        assert_eq!(buf.snapshot(), vec![frame("tx-1", TxState::Verifying)]);
    }

    #[test]
    fn test_equal_state_overwrites_in_place() {
        let mut buf = EventBuffer::new(4);
        add(&mut buf, "tx-1", TxState::Verifying);
        let newer = Bytes::from_static(b"event: tx-row\ndata: second verification\n\n");
        buf.add(&event("tx-1", TxState::Verifying), newer.clone());

        assert_eq!(buf.snapshot(), vec![newer]);
    }

    #[test]
    fn test_update_does_not_move_eviction_order() {
        let mut buf = EventBuffer::new(2);
        add(&mut buf, "tx-a", TxState::Submitted);
        add(&mut buf, "tx-b", TxState::Submitted);
        // Refreshing tx-a must not protect it from being the oldest insert.
        add(&mut buf, "tx-a", TxState::Complete);
        add(&mut buf, "tx-c", TxState::Submitted);

        assert_eq!(buf.state_of("tx-a"), None);
        assert_eq!(buf.state_of("tx-b"), Some(TxState::Submitted));
        assert_eq!(buf.state_of("tx-c"), Some(TxState::Submitted));
    }

    #[test]
    fn test_snapshot_skips_empty_slots() {
        let mut buf = EventBuffer::new(8);
        add(&mut buf, "tx-1", TxState::Submitted);
        add(&mut buf, "tx-2", TxState::Proving);

        let frames = buf.snapshot();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], frame("tx-1", TxState::Submitted));
        assert_eq!(frames[1], frame("tx-2", TxState::Proving));
    }

    #[test]
    fn test_capacity_overflow_by_two() {
        let mut buf = EventBuffer::new(50);
        for i in 0..52 {
            add(&mut buf, &format!("tx-{i}"), TxState::Submitted);
        }

        let frames = buf.snapshot();
        assert_eq!(frames.len(), 50);
        // tx-0 and tx-1 were evicted.
        assert_eq!(frames[0], frame("tx-2", TxState::Submitted));
        assert_eq!(frames[49], frame("tx-51", TxState::Submitted));
    }

    proptest! {
        #[test]
        fn prop_len_never_exceeds_capacity(
            ops in prop::collection::vec((0u8..40, 0u8..5), 0..200),
        ) {
            let mut buf = EventBuffer::new(7);
            for (key, state) in ops {
                let state = match state {
                    0 => TxState::Unknown,
                    1 => TxState::Submitted,
                    2 => TxState::Proving,
                    3 => TxState::Verifying,
                    _ => TxState::Complete,
                };
                add(&mut buf, &format!("tx-{key}"), state);
                prop_assert!(buf.len() <= 7);
                prop_assert_eq!(buf.snapshot().len(), buf.len());
            }
        }
    }
}
