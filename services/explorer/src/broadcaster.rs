//! Event broadcaster
//!
//! The single fan-out point between the upstream transaction feed and the
//! connected dashboard clients. One task runs the consume loop; it renders
//! each event exactly once, records the frame in the catch-up buffer, and
//! distributes it to every matching subscriber. A slow subscriber gets one
//! bounded retry and then loses the frame; it can never stall the loop or
//! the other subscribers beyond that bound.

use crate::event_buffer::EventBuffer;
use crate::filter::Filter;
use crate::store::cache::StatsCache;
use crate::templates;
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use types::event::Event;
use types::stats::StatsRange;

/// Catch-up buffer capacity: distinct transactions replayed to a new
/// unfiltered subscriber.
pub const BUFFER_SIZE: usize = 50;

/// Extra headroom on subscriber channels so a prefill of a full buffer plus
/// a couple of live frames never blocks.
const SUBSCRIBER_SLACK: usize = 2;

/// How often a rendered stats frame is pushed to all subscribers.
const STATS_INTERVAL: Duration = Duration::from_secs(2);

struct Client {
    tx: mpsc::Sender<Bytes>,
    filter: Filter,
}

struct Inner {
    next_id: u64,
    clients: HashMap<u64, Client>,
    buffer: EventBuffer,
}

struct Shared {
    inner: Mutex<Inner>,
    shutdown: CancellationToken,
    retry_timeout: Duration,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, id: u64) {
        if self.lock().clients.remove(&id).is_some() {
            info!(id, "client unsubscribed");
        }
    }
}

/// Handle to the process-wide broadcaster. Cheap to clone.
#[derive(Clone)]
pub struct Broadcaster {
    shared: Arc<Shared>,
}

impl Broadcaster {
    pub fn new(retry_timeout: Duration, shutdown: CancellationToken) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    next_id: 0,
                    clients: HashMap::new(),
                    buffer: EventBuffer::new(BUFFER_SIZE),
                }),
                shutdown,
                retry_timeout,
            }),
        }
    }

    /// The shutdown signal shared by the run loop and the streaming
    /// handlers, so stopping the broadcaster ends every open stream.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }

    /// Register a new subscriber.
    ///
    /// With `prefill`, the current catch-up buffer contents are copied into
    /// the subscription before any live event, oldest first. The filter
    /// applies to live events only, never to the prefilled history.
    pub fn subscribe(&self, filter: Filter, prefill: bool) -> Subscription {
        let (tx, rx) = mpsc::channel(BUFFER_SIZE + SUBSCRIBER_SLACK);
        let mut inner = self.shared.lock();
        let id = inner.next_id;
        inner.next_id += 1;

        if prefill {
            // A fresh channel is larger than the buffer, so this cannot fail.
            for frame in inner.buffer.snapshot() {
                if tx.try_send(frame).is_err() {
                    error!(id, "prefill overflowed a fresh subscriber channel");
                    break;
                }
            }
        }

        inner.clients.insert(id, Client { tx, filter });
        info!(id, "client subscribed");

        Subscription {
            id,
            rx,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Signal the run loop (and all streaming handlers) to stop. Safe to
    /// call any number of times.
    pub fn stop(&self) {
        self.shared.shutdown.cancel();
    }

    /// The consume-and-fan-out loop. Must be driven by exactly one task.
    ///
    /// Returns when the upstream channel closes or [`stop`](Self::stop) is
    /// called; both are normal termination.
    pub async fn run(
        &self,
        mut events: mpsc::Receiver<Event>,
        stats: Arc<StatsCache>,
    ) -> anyhow::Result<()> {
        let mut stats_tick = interval_at(Instant::now() + STATS_INTERVAL, STATS_INTERVAL);
        stats_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                maybe_event = events.recv() => match maybe_event {
                    Some(event) => {
                        debug!(tx_id = %event.tx_id, state = %event.state, "new tx event received");
                        match templates::tx_row_frame(&event) {
                            Ok(frame) => self.broadcast(Some(&event), frame).await,
                            Err(err) => error!(error = %err, "failed to render event, skipping"),
                        }
                    }
                    None => {
                        info!("event channel closed, broadcasting stopped");
                        return Ok(());
                    }
                },
                _ = stats_tick.tick() => {
                    let current = stats.cached(StatsRange::Week);
                    debug!("stats updated");
                    match templates::stats_frame(&current) {
                        Ok(frame) => self.broadcast(None, frame).await,
                        Err(err) => error!(error = %err, "failed to render stats, skipping"),
                    }
                },
                _ = self.shared.shutdown.cancelled() => return Ok(()),
            }
        }
    }

    /// Distribute one rendered frame.
    ///
    /// Transaction frames update the catch-up buffer and are filtered per
    /// subscriber; stats frames go to everyone and are never buffered.
    async fn broadcast(&self, event: Option<&Event>, frame: Bytes) {
        let recipients: Vec<(u64, mpsc::Sender<Bytes>)> = {
            let mut inner = self.shared.lock();
            if let Some(event) = event {
                inner.buffer.add(event, frame.clone());
            }
            inner
                .clients
                .iter()
                .filter(|(_, client)| event.map_or(true, |e| (client.filter)(e)))
                .map(|(id, client)| (*id, client.tx.clone()))
                .collect()
        };

        let mut blocked = Vec::new();
        for (id, tx) in recipients {
            match tx.try_send(frame.clone()) {
                Ok(()) => debug!(id, "frame delivered"),
                Err(TrySendError::Full(_)) => blocked.push((id, tx)),
                Err(TrySendError::Closed(_)) => debug!(id, "subscriber channel closed"),
            }
        }

        if blocked.is_empty() {
            return;
        }

        // One bounded retry per blocked subscriber; the retries run
        // concurrently, so one pass adds at most `retry_timeout` latency.
        let retry_timeout = self.shared.retry_timeout;
        join_all(blocked.into_iter().map(|(id, tx)| {
            let frame = frame.clone();
            async move {
                match tokio::time::timeout(retry_timeout, tx.send(frame)).await {
                    Ok(Ok(())) => debug!(id, "frame delivered after retry"),
                    Ok(Err(_)) => debug!(id, "subscriber channel closed"),
                    Err(_) => info!(id, "subscriber blocked, frame dropped"),
                }
            }
        }))
        .await;
    }

    #[cfg(test)]
    fn client_count(&self) -> usize {
        self.shared.lock().clients.len()
    }
}

/// A live subscription: a stream of rendered frames plus deregistration.
///
/// Dropping the subscription (or calling [`unsubscribe`](Self::unsubscribe))
/// removes it from the registry and closes the channel; both are idempotent.
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Bytes>,
    shared: Arc<Shared>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next frame, or `None` once the subscription is closed and drained.
    pub async fn recv(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }

    /// Deregister this subscription. No further frames will be written; any
    /// frames already queued can still be read.
    pub fn unsubscribe(&self) {
        self.shared.remove(self.id);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl futures::Stream for Subscription {
    type Item = Bytes;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Bytes>> {
        self.rx.poll_recv(cx)
    }
}
