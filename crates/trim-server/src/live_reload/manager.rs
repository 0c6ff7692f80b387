//! Live reload manager.
//!
//! Owns the resource graph and the watcher pool, and ties them to HTTP
//! traffic: served files are recorded against the page that requested them,
//! and reload connections turn a page's recorded files into watches.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;

use super::graph::{PageKey, ResourceGraph};
use super::pool::WatcherPool;
use super::subscription::{Connection, ReloadSubscription};
use super::sweeper::spawn_sweeper;
use crate::paths;

/// Tunables for the live reload engine.
#[derive(Clone, Debug)]
pub struct LiveReloadOptions {
    /// Quiet period that collapses a burst of file events.
    pub debounce: Duration,
    /// Period between sweeps of unused watches.
    pub sweep_interval: Duration,
    /// Force a reload when a page connects without recorded files.
    ///
    /// Pages without subresources keep reloading while this is on.
    pub force_reload_untracked: bool,
}

impl Default for LiveReloadOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(50),
            sweep_interval: Duration::from_secs(300),
            force_reload_untracked: true,
        }
    }
}

/// Tracks which files each page loaded and watches them while the page is open.
pub(crate) struct LiveReloadManager {
    root_dir: PathBuf,
    graph: Mutex<ResourceGraph>,
    pool: Arc<WatcherPool>,
    options: LiveReloadOptions,
    sweeper: Option<JoinHandle<()>>,
}

impl LiveReloadManager {
    /// Create a manager for files served from `root_dir`.
    #[must_use]
    pub(crate) fn new(root_dir: PathBuf, options: LiveReloadOptions) -> Self {
        Self {
            root_dir,
            graph: Mutex::new(ResourceGraph::default()),
            pool: Arc::new(WatcherPool::new(options.debounce)),
            options,
            sweeper: None,
        }
    }

    /// Start the background sweeper.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn start(&mut self) {
        if self.sweeper.is_none() {
            self.sweeper = Some(spawn_sweeper(
                Arc::clone(&self.pool),
                self.options.sweep_interval,
            ));
            tracing::debug!(
                interval_secs = self.options.sweep_interval.as_secs(),
                "Watch sweeper started"
            );
        }
    }

    /// Record that `file_path` was served for a request declared by `origin`.
    ///
    /// Source maps are never recorded, and a document is never recorded as
    /// its own dependency. When the origin is not an HTML document, the file
    /// is also attributed to whichever page loaded the origin resource.
    pub(crate) fn record_served(&self, origin: &str, file_path: &Path) {
        if paths::is_source_map(file_path) {
            return;
        }

        let page = PageKey::from_origin(origin);
        if self.page_document(&page).as_deref() == Some(file_path) {
            return;
        }

        let mut graph = self.graph();
        if graph.record_load(&page, file_path) {
            tracing::debug!(page = %page, path = %file_path.display(), "Recorded dependency");
        }
        if page.is_document() {
            return;
        }

        let Some(origin_file) = self.origin_file(&page) else {
            return;
        };
        if let Some(owner) = graph.resolve_indirect_owner(&origin_file, file_path) {
            tracing::debug!(
                page = %owner,
                via = %origin_file.display(),
                path = %file_path.display(),
                "Recorded indirect dependency"
            );
        }
    }

    /// Open a reload connection for the page declared by `origin`.
    ///
    /// Consumes the page's recorded files so the next navigation starts from
    /// a clean list. A page with recorded files also watches its own document.
    pub(crate) fn connect(&self, origin: &str) -> Connection {
        let page = PageKey::from_origin(origin);
        let mut files = self.graph().take_snapshot_and_reset(&page);

        if files.is_empty() {
            tracing::debug!(page = %page, "No recorded files for page");
            return if self.options.force_reload_untracked {
                Connection::ForceReload
            } else {
                Connection::Idle
            };
        }

        if let Some(document) = self.page_document(&page) {
            files.insert(document);
        }

        Connection::Watching(ReloadSubscription::open(
            Arc::clone(&self.pool),
            page,
            files,
        ))
    }

    /// File below the root that `page` names.
    fn origin_file(&self, page: &PageKey) -> Option<PathBuf> {
        page.url_path()
            .and_then(|url_path| paths::resolve(&self.root_dir, &url_path))
    }

    /// HTML document served for `page`, if the page is one.
    ///
    /// Directory URLs (`/guide/`) name their `index.html`.
    fn page_document(&self, page: &PageKey) -> Option<PathBuf> {
        let url_path = page.url_path()?;
        let file = paths::resolve(&self.root_dir, &url_path)?;
        if url_path.ends_with('/') {
            Some(file.join("index.html"))
        } else if page.is_document() {
            Some(file)
        } else {
            None
        }
    }

    #[cfg(test)]
    pub(crate) fn pool(&self) -> &WatcherPool {
        &self.pool
    }

    #[cfg(test)]
    pub(crate) fn recorded(&self, origin: &str) -> Vec<PathBuf> {
        let page = PageKey::from_origin(origin);
        let mut files: Vec<_> = self
            .graph()
            .files(&page)
            .map(|files| files.iter().cloned().collect())
            .unwrap_or_default();
        files.sort();
        files
    }

    fn graph(&self) -> MutexGuard<'_, ResourceGraph> {
        self.graph.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for LiveReloadManager {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const INDEX: &str = "http://localhost:8013/index.html";
    const WAIT: Duration = Duration::from_secs(5);

    struct Site {
        dir: tempfile::TempDir,
        manager: LiveReloadManager,
    }

    impl Site {
        fn new(files: &[(&str, &str)]) -> Self {
            let dir = tempfile::tempdir().unwrap();
            for (name, content) in files {
                let path = dir.path().join(name);
                std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                std::fs::write(path, content).unwrap();
            }
            let options = LiveReloadOptions {
                debounce: Duration::from_millis(20),
                ..LiveReloadOptions::default()
            };
            let manager = LiveReloadManager::new(dir.path().to_path_buf(), options);
            Self { dir, manager }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }
    }

    #[test]
    fn test_record_served_is_idempotent() {
        let site = Site::new(&[("style.css", "body {}")]);

        site.manager.record_served(INDEX, &site.path("style.css"));
        site.manager.record_served(INDEX, &site.path("style.css"));

        assert_eq!(site.manager.recorded(INDEX), vec![site.path("style.css")]);
    }

    #[test]
    fn test_record_served_normalizes_origin() {
        let site = Site::new(&[("style.css", "body {}")]);

        site.manager
            .record_served("http://localhost:8013/index.html?v=3#intro", &site.path("style.css"));

        assert_eq!(site.manager.recorded(INDEX), vec![site.path("style.css")]);
    }

    #[test]
    fn test_record_served_skips_source_maps() {
        let site = Site::new(&[("app.js.map", "{}")]);

        site.manager.record_served(INDEX, &site.path("app.js.map"));

        assert!(site.manager.recorded(INDEX).is_empty());
    }

    #[test]
    fn test_record_served_attributes_css_import() {
        let site = Site::new(&[("style.css", "@import 'base.css';"), ("base.css", "")]);
        site.manager.record_served(INDEX, &site.path("style.css"));

        site.manager
            .record_served("http://localhost:8013/style.css", &site.path("base.css"));

        assert_eq!(
            site.manager.recorded(INDEX),
            vec![site.path("base.css"), site.path("style.css")]
        );
    }

    #[test]
    fn test_record_served_unattributable_resource() {
        let site = Site::new(&[("font.woff2", "")]);

        site.manager
            .record_served("http://localhost:8013/unknown.css", &site.path("font.woff2"));

        assert!(site.manager.recorded(INDEX).is_empty());
    }

    #[tokio::test]
    async fn test_connect_untracked_page_forces_reload() {
        let site = Site::new(&[("index.html", "<body></body>")]);

        let connection = site.manager.connect(INDEX);

        assert!(matches!(connection, Connection::ForceReload));
        assert_eq!(site.manager.pool().watch_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_untracked_page_idle_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let options = LiveReloadOptions {
            force_reload_untracked: false,
            ..LiveReloadOptions::default()
        };
        let manager = LiveReloadManager::new(dir.path().to_path_buf(), options);

        assert!(matches!(manager.connect(INDEX), Connection::Idle));
    }

    #[tokio::test]
    async fn test_connect_takes_snapshot() {
        let site = Site::new(&[("style.css", "body {}")]);
        site.manager.record_served(INDEX, &site.path("style.css"));

        let connection = site.manager.connect(INDEX);

        assert!(matches!(connection, Connection::Watching(_)));
        assert!(site.manager.recorded(INDEX).is_empty());
        assert!(site.manager.pool().is_watched(&site.path("style.css")));
    }

    #[tokio::test]
    async fn test_change_reload_close_sweep_cycle() {
        let site = Site::new(&[("index.html", "<body></body>"), ("style.css", "body {}")]);
        let css = site.path("style.css");
        site.manager.record_served(INDEX, &site.path("index.html"));
        site.manager.record_served(INDEX, &css);

        let mut connection = site.manager.connect(INDEX);
        std::fs::write(&css, "body { color: red }").unwrap();

        let reload = tokio::time::timeout(WAIT, connection.wait_for_reload()).await;
        assert_eq!(reload, Ok(true));

        drop(connection);
        assert!(site.manager.pool().is_pending(&css));
        assert!(site.manager.pool().is_watched(&css));

        assert_eq!(site.manager.pool().sweep(), 2);
        assert!(!site.manager.pool().is_watched(&css));
    }

    #[tokio::test]
    async fn test_reconnect_before_sweep_reuses_watch() {
        let site = Site::new(&[("index.html", "<body></body>"), ("style.css", "body {}")]);
        let css = site.path("style.css");
        site.manager.record_served(INDEX, &css);
        drop(site.manager.connect(INDEX));

        // Page reloads and fetches its stylesheet again.
        site.manager.record_served(INDEX, &css);
        let _connection = site.manager.connect(INDEX);

        assert_eq!(site.manager.pool().watch_count(), 2);
        assert!(!site.manager.pool().is_pending(&css));
        assert_eq!(site.manager.pool().sweep(), 0);
    }

    #[tokio::test]
    async fn test_atomic_saves_reload_across_reconnects() {
        let site = Site::new(&[("index.html", "<body></body>"), ("style.css", "body {}")]);
        let css = site.path("style.css");

        for color in ["red", "blue"] {
            site.manager.record_served(INDEX, &css);
            let mut connection = site.manager.connect(INDEX);

            // Editors save by renaming a temp file over the target.
            let tmp = site.path("style.css.tmp");
            std::fs::write(&tmp, format!("body {{ color: {color} }}")).unwrap();
            std::fs::rename(&tmp, &css).unwrap();

            let reload = tokio::time::timeout(WAIT, connection.wait_for_reload()).await;
            assert_eq!(reload, Ok(true), "no reload after saving {color}");
        }
    }

    #[test]
    fn test_document_is_not_its_own_dependency() {
        let site = Site::new(&[("index.html", "<body></body>")]);

        site.manager.record_served(INDEX, &site.path("index.html"));

        assert!(site.manager.recorded(INDEX).is_empty());
    }

    #[test]
    fn test_directory_index_is_not_its_own_dependency() {
        let site = Site::new(&[("guide/index.html", "<body></body>")]);

        site.manager.record_served(
            "http://localhost:8013/guide/",
            &site.path("guide/index.html"),
        );

        assert!(site.manager.recorded("http://localhost:8013/guide/").is_empty());
    }

    #[tokio::test]
    async fn test_page_alone_forces_reload() {
        let site = Site::new(&[("index.html", "<body></body>")]);
        site.manager.record_served(INDEX, &site.path("index.html"));

        let mut connection = site.manager.connect(INDEX);

        let reload = tokio::time::timeout(WAIT, connection.wait_for_reload()).await;
        assert_eq!(reload, Ok(true));
        assert!(matches!(connection, Connection::ForceReload));
        assert_eq!(site.manager.pool().watch_count(), 0);
    }

    #[tokio::test]
    async fn test_editing_document_reloads() {
        let site = Site::new(&[("index.html", "<body></body>"), ("style.css", "body {}")]);
        site.manager.record_served(INDEX, &site.path("style.css"));
        let mut connection = site.manager.connect(INDEX);

        std::fs::write(site.path("index.html"), "<body><p>new</p></body>").unwrap();

        let reload = tokio::time::timeout(WAIT, connection.wait_for_reload()).await;
        assert_eq!(reload, Ok(true));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_spawns_sweeper() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("style.css");
        std::fs::write(&css, "body {}").unwrap();
        let mut manager = LiveReloadManager::new(
            dir.path().to_path_buf(),
            LiveReloadOptions {
                sweep_interval: Duration::from_secs(10),
                ..LiveReloadOptions::default()
            },
        );
        manager.start();
        manager.record_served(INDEX, &css);
        drop(manager.connect(INDEX));

        tokio::time::sleep(Duration::from_secs(11)).await;

        assert!(!manager.pool().is_watched(&css));
    }
}
