// API module - HTTP endpoints

pub mod health;
pub mod middleware;
pub mod tokens;

use axum::Router;
use tower_http::trace::TraceLayer;

use middleware::state::AppState;

/// Builds the full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(tokens::router(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
