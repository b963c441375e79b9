use crate::handlers::{events, pages, stats, stream};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/stream", get(stream::stream))
        .route("/stats", get(stats::stats))
        .route("/events", get(events::events));

    Router::new()
        .route("/", get(pages::index))
        .nest("/api/v1", api_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
