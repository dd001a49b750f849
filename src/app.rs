use axum::extract::DefaultBodyLimit;
use axum::Router;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

// Pub/Sub caps push messages at 10MB.
const MAX_PUSH_BODY_BYTES: usize = 10 * 1024 * 1024;

pub fn create_app(state: AppState) -> Router {
    crate::routes::configure_routes()
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(MAX_PUSH_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
