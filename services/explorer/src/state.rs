use crate::broadcaster::Broadcaster;
use crate::store::cache::StatsCache;
use crate::store::Store;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub stats: Arc<StatsCache>,
    pub broadcaster: Broadcaster,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, stats: Arc<StatsCache>, broadcaster: Broadcaster) -> Self {
        Self {
            store,
            stats,
            broadcaster,
        }
    }
}
