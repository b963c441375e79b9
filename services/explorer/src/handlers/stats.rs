use crate::state::AppState;
use crate::templates;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;
use tracing::error;
use types::stats::StatsRange;

#[derive(Debug, Deserialize)]
pub struct StatsParams {
    range: Option<String>,
}

pub async fn stats(
    State(state): State<AppState>,
    Query(params): Query<StatsParams>,
) -> Response {
    let range = StatsRange::parse(params.range.as_deref().unwrap_or_default());
    let current = state.stats.cached(range);
    match templates::stats_block(&current) {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(error = %err, "failed to render stats");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
