use axum::{
    extract::{DefaultBodyLimit, FromRequest},
    http::Method,
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::{error::AppError, AppState};

pub mod chat;
pub mod csv;

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_check))
        .merge(chat::routes())
        .merge(csv::routes())
        .layer(DefaultBodyLimit::max(state.config.max_file_size))
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

/// `Json` extractor whose rejections are reported through `AppError`.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct AppJson<T>(pub T);

/// A text field counts as supplied when it is present and non-empty.
pub(crate) fn supplied(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Milliseconds since the Unix epoch, as the UI expects.
pub(crate) fn timestamp_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
