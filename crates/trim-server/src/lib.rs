//! HTTP server for trim, a live-reloading static HTML dev server.
//!
//! This crate serves a directory of static files with axum:
//! - Static files below the site root, gzip-compressed when accepted
//! - HTML with an injected reload script, minified on the fly
//! - Server-Sent Events endpoint (`/livereload`) for live reload
//!
//! # Quick Start
//!
//! ```ignore
//! use std::path::PathBuf;
//! use trim_server::{ServerConfig, run_server};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig {
//!         root_dir: PathBuf::from("site"),
//!         ..ServerConfig::default()
//!     };
//!
//!     run_server(config).await.unwrap();
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! Browser ──HTTP──► axum server (trim-server)
//!                        │
//!                        ├─► Static files ──► ResourceGraph (page → files)
//!                        │
//!                        └─► /livereload (SSE)
//!                                │
//!                                └─► WatcherPool ──► notify (one watch per file)
//!                                        ▲
//!                                        └── sweeper closes unused watches
//! ```

mod app;
mod error;
mod html;
mod live_reload;
mod paths;
mod state;
mod static_files;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use trim_config::MinifyLevel;

pub use error::ServerError;
pub use live_reload::LiveReloadOptions;

use html::MinifyHtml;
use live_reload::LiveReloadManager;
use state::AppState;

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory served as the site root.
    pub root_dir: PathBuf,
    /// HTML minification level.
    pub minify: MinifyLevel,
    /// Enable live reload.
    pub live_reload_enabled: bool,
    /// Live reload tunables.
    pub live_reload: LiveReloadOptions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 8013,
            root_dir: PathBuf::from("."),
            minify: MinifyLevel::default(),
            live_reload_enabled: true,
            live_reload: LiveReloadOptions::default(),
        }
    }
}

/// Run the server.
///
/// # Arguments
///
/// * `config` - Server configuration
///
/// # Errors
///
/// Returns an error if the root directory does not exist or the server
/// fails to bind.
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let root_dir = tokio::fs::canonicalize(&config.root_dir)
        .await
        .map_err(|e| format!("Cannot serve {}: {e}", config.root_dir.display()))?;

    // Create live reload manager if enabled
    let live_reload = if config.live_reload_enabled {
        let mut manager = LiveReloadManager::new(root_dir.clone(), config.live_reload.clone());
        manager.start();
        Some(manager)
    } else {
        None
    };

    let (shutdown, _) = watch::channel(false);
    let state = Arc::new(AppState {
        root_dir: root_dir.clone(),
        minifier: Box::new(MinifyHtml::new(config.minify)),
        live_reload,
        shutdown,
    });

    // Create router
    let app = app::create_router(Arc::clone(&state));

    // Bind and run server
    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port)).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        root = %root_dir.display(),
        "Starting server"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;

    Ok(())
}

/// Wait for shutdown signal (Ctrl-C), then release open reload streams.
async fn shutdown_signal(state: Arc<AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, stopping server...");
    state.shutdown.send_replace(true);
}

/// Create server configuration from trim config.
///
/// # Arguments
///
/// * `config` - Loaded trim configuration
#[must_use]
pub fn server_config_from_config(config: &trim_config::Config) -> ServerConfig {
    let live_reload = &config.live_reload;

    ServerConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        root_dir: config.site_resolved.root_dir.clone(),
        minify: config.site_resolved.minify,
        live_reload_enabled: live_reload.enabled,
        live_reload: LiveReloadOptions {
            debounce: Duration::from_millis(live_reload.debounce_ms),
            sweep_interval: Duration::from_secs(live_reload.sweep_interval_secs),
            force_reload_untracked: live_reload.force_reload_untracked,
        },
    }
}
