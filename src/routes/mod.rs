pub mod comments;
pub mod communities;
pub mod posts;
pub mod users;

use axum::middleware;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::error;
use crate::state::AppState;

/// Build the full HTTP application.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(users::router())
        .merge(communities::router())
        .merge(posts::router())
        .merge(comments::router());

    if state.config.is_development() {
        router = router.layer(middleware::from_fn(error::expose_error_detail));
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
