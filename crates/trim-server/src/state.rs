//! Application state.
//!
//! Shared state for all request handlers.

use std::path::PathBuf;

use tokio::sync::watch;

use crate::html::HtmlMinifier;
use crate::live_reload::LiveReloadManager;

/// Application state shared across all handlers.
pub(crate) struct AppState {
    /// Canonical site root; every served file lives below it.
    pub(crate) root_dir: PathBuf,
    /// Minifier applied to served HTML.
    pub(crate) minifier: Box<dyn HtmlMinifier>,
    /// Live reload manager (if enabled).
    pub(crate) live_reload: Option<LiveReloadManager>,
    /// Flipped to `true` once the server starts shutting down, so open
    /// reload streams can end.
    pub(crate) shutdown: watch::Sender<bool>,
}
