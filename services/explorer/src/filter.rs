//! Subscriber content filters
//!
//! A filter is a pure predicate over events, supplied at subscribe time and
//! evaluated once per event per subscriber during fan-out. The two variants
//! the dashboard needs are "everything" and "substring since a cutoff".

use chrono::{DateTime, Utc};
use std::sync::Arc;
use types::event::Event;

/// Shared, side-effect-free predicate deciding whether a subscriber wants
/// a given live event.
pub type Filter = Arc<dyn Fn(&Event) -> bool + Send + Sync>;

/// Matches every event. Used by the unfiltered dashboard stream.
pub fn match_all() -> Filter {
    Arc::new(|_| true)
}

/// Matches events strictly newer than `since` whose tx id, prover id or tag
/// contains `needle`. The needle is case-folded once at construction; event
/// fields are matched as-is, like the search endpoint does.
pub fn search(needle: &str, since: DateTime<Utc>) -> Filter {
    let needle = needle.to_lowercase();
    Arc::new(move |event| event.timestamp > since && event.matches(&needle))
}
