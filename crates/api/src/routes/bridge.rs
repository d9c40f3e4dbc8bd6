use axum::routing::post;
use axum::Router;

use crate::handlers::bridge;
use crate::state::AppState;

/// Dispatch endpoint routes, mounted under `/api/v1/bridge`.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/enqueue",
        post(bridge::dispatch)
            .get(bridge::fleet_status)
            .fallback(bridge::method_not_allowed),
    )
}
