use crate::templates;
use axum::response::Html;

pub async fn index() -> Html<String> {
    Html(templates::index())
}
