//! Router construction.
//!
//! Builds the axum router with all routes and middleware.

use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::live_reload;
use crate::state::AppState;
use crate::static_files;

/// Path of the live reload event stream.
pub(crate) const LIVE_RELOAD_PATH: &str = "/livereload";

/// Create the application router.
///
/// # Arguments
///
/// * `state` - Shared application state
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    // Event stream for live reload
    if state.live_reload.is_some() {
        router = router.route(LIVE_RELOAD_PATH, get(live_reload::sse_handler));
    }

    // Everything else comes from the site root
    router = router.merge(static_files::static_router());

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
