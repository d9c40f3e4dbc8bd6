pub mod bridge;
pub mod health;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /bridge/enqueue      POST dispatch, GET fleet status, other methods 405
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/bridge", bridge::router())
}
