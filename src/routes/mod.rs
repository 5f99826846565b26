pub mod health;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v3/ping", get(health::ping))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
