//! Storage layer
//!
//! The HTTP handlers and the stats cache talk to a [`Store`]; the two
//! backends are Postgres (production) and an in-process mock (demo and
//! tests). Live transaction events are a separate concern: each backend
//! owns a feeder task pushing [`Event`]s into an `mpsc` channel consumed
//! by the broadcaster.

pub mod cache;
pub mod mock;
pub mod pg;

use async_trait::async_trait;
use thiserror::Error;
use types::event::Event;
use types::stats::{Stats, StatsRange};

/// Maximum number of search results, newest first.
pub const SEARCH_LIMIT: usize = 50;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Aggregate counters for the given time range.
    async fn stats(&self, range: StatsRange) -> Result<Stats, StoreError>;

    /// The most recent events matching a free-text filter, newest first,
    /// capped at [`SEARCH_LIMIT`].
    async fn search(&self, filter: &str) -> Result<Vec<Event>, StoreError>;
}
