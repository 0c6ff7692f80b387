//! Static file serving.
//!
//! Every path that is not a server route is looked up below the site root.
//! HTML documents get the reload script injected and are minified; every
//! served file is recorded for live reload against the page that asked for it.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, Uri, header};
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::html;
use crate::paths;
use crate::state::AppState;

/// Create router for static file serving.
pub(crate) fn static_router() -> Router<Arc<AppState>> {
    Router::new().fallback(serve_file)
}

/// Serve a file from the site root.
async fn serve_file(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ServerError> {
    let url_path = uri.path();
    let file_path = locate(&state, url_path).await?;
    let content = tokio::fs::read(&file_path)
        .await
        .map_err(|e| not_found_or_io(e, &file_path))?;

    let referer = headers
        .get(header::REFERER)
        .and_then(|value| value.to_str().ok());
    let content_type = paths::content_type(&file_path);

    let response = if paths::is_html(&file_path) {
        // First navigation to a page usually has no referer.
        let origin = referer.map_or_else(
            || synthesize_origin(&headers, url_path),
            ToOwned::to_owned,
        );
        record(&state, Some(&origin), &file_path);

        let body = render_html(&state, &content);
        (
            [
                (header::CONTENT_TYPE, content_type),
                (header::CACHE_CONTROL, "no-cache".to_owned()),
            ],
            body,
        )
            .into_response()
    } else {
        record(&state, referer, &file_path);
        ([(header::CONTENT_TYPE, content_type)], content).into_response()
    };

    tracing::debug!(path = %url_path, file = %file_path.display(), "Served file");
    Ok(response)
}

/// Find the file for `url_path`, mapping directories to their `index.html`.
async fn locate(state: &AppState, url_path: &str) -> Result<PathBuf, ServerError> {
    let mut file_path = paths::resolve(&state.root_dir, url_path)
        .ok_or_else(|| ServerError::Forbidden(url_path.to_owned()))?;

    let metadata = tokio::fs::metadata(&file_path)
        .await
        .map_err(|e| not_found_or_io(e, &file_path))?;
    if metadata.is_dir() {
        file_path.push("index.html");
    }
    Ok(file_path)
}

fn not_found_or_io(e: std::io::Error, path: &Path) -> ServerError {
    match e.kind() {
        ErrorKind::NotFound | ErrorKind::NotADirectory => {
            ServerError::FileNotFound(path.to_path_buf())
        }
        _ => ServerError::Io(e),
    }
}

/// Origin for an HTML request without a `Referer`: `http://{Host}{path}`.
fn synthesize_origin(headers: &HeaderMap, url_path: &str) -> String {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("localhost");
    format!("http://{host}{url_path}")
}

fn record(state: &AppState, origin: Option<&str>, file_path: &Path) {
    if let (Some(live_reload), Some(origin)) = (&state.live_reload, origin) {
        live_reload.record_served(origin, file_path);
    }
}

/// Inject the reload script (when live reload is on) and minify.
fn render_html(state: &AppState, content: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    if state.live_reload.is_some() {
        let injected = html::inject_reload_script(&html);
        state.minifier.minify(injected.as_bytes())
    } else {
        state.minifier.minify(html.as_bytes())
    }
}
