use crate::filter;
use crate::state::AppState;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct StreamParams {
    q: Option<String>,
    since: Option<String>,
}

/// Server-sent-events stream of live dashboard updates.
///
/// Without a query this is the main dashboard feed: the catch-up buffer is
/// replayed first, then every live event. With a query it becomes a
/// live-tail of matching events only, with no replay (the search endpoint
/// already returned the history).
pub async fn stream(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Response {
    let q = params.q.unwrap_or_default().trim().to_lowercase();
    let (filter, prefill) = if q.is_empty() {
        (filter::match_all(), true)
    } else {
        (filter::search(&q, parse_since(params.since.as_deref())), false)
    };

    let subscription = state.broadcaster.subscribe(filter, prefill);
    info!(id = subscription.id(), query = %q, "stream opened");

    let shutdown = state.broadcaster.shutdown_token();
    let frames = subscription
        .map(Ok::<_, Infallible>)
        .take_until(shutdown.cancelled_owned());

    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

fn parse_since(since: Option<&str>) -> DateTime<Utc> {
    let Some(since) = since else {
        return DateTime::<Utc>::UNIX_EPOCH;
    };
    match DateTime::parse_from_rfc3339(since) {
        Ok(t) => t.with_timezone(&Utc),
        Err(err) => {
            error!(error = %err, since, "failed to parse 'since', using epoch");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}
