use crate::state::AppState;
use crate::templates;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::error;

#[derive(Debug, Deserialize)]
pub struct EventsParams {
    q: Option<String>,
}

/// Search results table. Store failures are logged and rendered as an
/// empty result set rather than surfaced to the client.
pub async fn events(
    State(state): State<AppState>,
    Query(params): Query<EventsParams>,
) -> Response {
    let q = params.q.unwrap_or_default().trim().to_lowercase();
    if q.is_empty() {
        return render(templates::table(&[], None));
    }

    let events = match state.store.search(&q).await {
        Ok(events) => events,
        Err(err) => {
            error!(error = %err, "failed to search events");
            Vec::new()
        }
    };

    // The follow-up live tail starts strictly after the newest result to
    // avoid duplicating rows already in the table.
    let since = events.first().map(|e| e.timestamp);
    render(templates::table(&events, Some((&q, since))))
}

fn render(result: Result<String, std::fmt::Error>) -> Response {
    match result {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(error = %err, "failed to render events table");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
