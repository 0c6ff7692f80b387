//! Server-Sent Events endpoint for live reload.
//!
//! Each browser tab holds one `/livereload` connection. The stream sends a
//! handshake, then at most one reload message, and then stays open until the
//! client goes away or the server shuts down.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};

use crate::state::AppState;

/// Handle a live reload connection.
///
/// Requests without a `Referer` cannot be tied to a page and are answered
/// with an empty body.
pub(crate) async fn sse_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    let Some(live_reload) = state.live_reload.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let Some(origin) = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok())
    else {
        tracing::debug!("Live reload request without referer");
        return StatusCode::OK.into_response();
    };

    let mut connection = live_reload.connect(origin);
    let mut shutdown = state.shutdown.subscribe();

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("sse").data("connected"));

        let reload = tokio::select! {
            reload = connection.wait_for_reload() => reload,
            _ = shutdown.wait_for(|stopping| *stopping) => false,
        };
        if reload {
            yield Ok(Event::default().event("message").data("1"));
        }

        // Keep the connection (and its subscription) until shutdown.
        let _ = shutdown.wait_for(|stopping| *stopping).await;
    };

    Sse::new(stream)
        .keep_alive(KeepAlive::default())
        .into_response()
}
