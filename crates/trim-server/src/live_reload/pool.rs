//! Reference-counted pool of file watches.
//!
//! One [`FileWatch`] per file path, shared by every page interested in it.
//! Releasing the last interest only marks the path as pending; the native
//! watch is closed by a later [`WatcherPool::sweep`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::broadcast;

use super::graph::PageKey;
use super::watch::{FileWatch, WatchEventKind};

/// Capacity of the change broadcast channel.
const CHANGE_CAPACITY: usize = 100;

/// A reported change to a watched file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct FileChange {
    pub path: PathBuf,
    pub kind: WatchEventKind,
}

/// Watch state for one file path.
struct WatchEntry {
    /// `None` when the native watch could not be started.
    watch: Option<FileWatch>,
    /// Open reload connections per page.
    interested: HashMap<PageKey, usize>,
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<PathBuf, WatchEntry>,
    /// Paths whose interest dropped to zero since the last sweep.
    pending_unwatch: HashSet<PathBuf>,
}

/// Shared file watches, reference-counted by interested pages.
pub(crate) struct WatcherPool {
    state: Mutex<PoolState>,
    changes: broadcast::Sender<FileChange>,
    debounce: Duration,
}

impl WatcherPool {
    /// Create an empty pool whose watches debounce over `debounce`.
    pub(crate) fn new(debounce: Duration) -> Self {
        let (changes, _rx) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            state: Mutex::new(PoolState::default()),
            changes,
            debounce,
        }
    }

    /// Receive every change reported by any watch in the pool.
    pub(crate) fn listen(&self) -> broadcast::Receiver<FileChange> {
        self.changes.subscribe()
    }

    /// Register interest of `page` in `path`, starting a watch if needed.
    pub(crate) fn subscribe(&self, page: &PageKey, path: &Path) {
        let mut guard = self.lock();
        let PoolState {
            entries,
            pending_unwatch,
        } = &mut *guard;

        pending_unwatch.remove(path);
        let entry = entries
            .entry(path.to_path_buf())
            .or_insert_with(|| WatchEntry {
                watch: None,
                interested: HashMap::new(),
            });
        // Also retries a watch that failed to start earlier.
        if entry.watch.is_none() {
            entry.watch = self.start_watch(path);
        }
        *entry.interested.entry(page.clone()).or_insert(0) += 1;
    }

    /// Release one interest of `page` in `path`.
    ///
    /// When no page is left the path becomes pending; the watch itself stays
    /// open until the next sweep.
    pub(crate) fn unsubscribe(&self, page: &PageKey, path: &Path) {
        let mut guard = self.lock();
        let PoolState {
            entries,
            pending_unwatch,
        } = &mut *guard;

        let Some(entry) = entries.get_mut(path) else {
            return;
        };
        if let Some(count) = entry.interested.get_mut(page) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                entry.interested.remove(page);
            }
        }
        if entry.interested.is_empty() {
            pending_unwatch.insert(path.to_path_buf());
        }
    }

    /// Whether `page` currently holds interest in `path`.
    pub(crate) fn is_interested(&self, path: &Path, page: &PageKey) -> bool {
        self.lock()
            .entries
            .get(path)
            .is_some_and(|entry| entry.interested.contains_key(page))
    }

    /// Close watches that are still unused since they became pending.
    ///
    /// The pending set is cleared either way. Returns the number of watches
    /// closed.
    pub(crate) fn sweep(&self) -> usize {
        let mut guard = self.lock();
        let PoolState {
            entries,
            pending_unwatch,
        } = &mut *guard;

        let mut closed = 0;
        for path in pending_unwatch.drain() {
            let idle = entries
                .get(&path)
                .is_some_and(|entry| entry.interested.is_empty());
            if !idle {
                continue;
            }
            if let Some(entry) = entries.remove(&path) {
                if let Some(watch) = entry.watch {
                    tracing::info!(path = %watch.path().display(), "Unwatched file");
                }
                closed += 1;
            }
        }
        closed
    }

    fn start_watch(&self, path: &Path) -> Option<FileWatch> {
        let changes = self.changes.clone();
        let changed_path = path.to_path_buf();
        let on_event = move |kind| {
            // No receivers just means no tab is connected right now.
            let _ = changes.send(FileChange {
                path: changed_path.clone(),
                kind,
            });
        };

        match FileWatch::start(path, self.debounce, on_event) {
            Ok(watch) => {
                tracing::debug!(path = %path.display(), "Watching file");
                Some(watch)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to watch file");
                None
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    pub(crate) fn is_watched(&self, path: &Path) -> bool {
        self.lock().entries.contains_key(path)
    }

    #[cfg(test)]
    pub(crate) fn is_pending(&self, path: &Path) -> bool {
        self.lock().pending_unwatch.contains(path)
    }

    #[cfg(test)]
    pub(crate) fn has_native_watch(&self, path: &Path) -> bool {
        self.lock()
            .entries
            .get(path)
            .is_some_and(|entry| entry.watch.is_some())
    }

    #[cfg(test)]
    pub(crate) fn watch_count(&self) -> usize {
        self.lock().entries.len()
    }

    #[cfg(test)]
    pub(crate) fn publish(&self, change: FileChange) {
        let _ = self.changes.send(change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(origin: &str) -> PageKey {
        PageKey::from_origin(origin)
    }

    fn site_file(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, name).unwrap();
        path
    }

    fn pool() -> WatcherPool {
        WatcherPool::new(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_subscribe_creates_watch() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();

        pool.subscribe(&index, &css);

        assert!(pool.is_watched(&css));
        assert!(pool.is_interested(&css, &index));
        assert!(!pool.is_pending(&css));
    }

    #[tokio::test]
    async fn test_unsubscribe_marks_pending_without_closing() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();

        pool.subscribe(&index, &css);
        pool.unsubscribe(&index, &css);

        assert!(pool.is_watched(&css));
        assert!(pool.is_pending(&css));
        assert!(!pool.is_interested(&css, &index));
    }

    #[tokio::test]
    async fn test_sweep_closes_idle_watch() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();
        pool.subscribe(&index, &css);
        pool.unsubscribe(&index, &css);

        assert_eq!(pool.sweep(), 1);

        assert!(!pool.is_watched(&css));
        assert!(!pool.is_pending(&css));
    }

    #[tokio::test]
    async fn test_resubscribe_before_sweep_reuses_watch() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();
        pool.subscribe(&index, &css);
        pool.unsubscribe(&index, &css);

        pool.subscribe(&index, &css);

        assert_eq!(pool.watch_count(), 1);
        assert!(!pool.is_pending(&css));
        assert_eq!(pool.sweep(), 0);
        assert!(pool.is_watched(&css));
    }

    #[tokio::test]
    async fn test_sweep_skips_reacquired_path_and_clears_pending() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let about = page("http://localhost/about.html");
        let index = page("http://localhost/index.html");
        let pool = pool();
        pool.subscribe(&index, &css);
        pool.unsubscribe(&index, &css);
        // Another page picks the file up while it is still pending.
        pool.subscribe(&about, &css);
        pool.unsubscribe(&about, &css);
        pool.subscribe(&about, &css);

        assert_eq!(pool.sweep(), 0);
        assert!(pool.is_watched(&css));
        assert!(!pool.is_pending(&css));
    }

    #[tokio::test]
    async fn test_shared_file_counts_each_connection() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();

        // Two tabs on the same page.
        pool.subscribe(&index, &css);
        pool.subscribe(&index, &css);
        pool.unsubscribe(&index, &css);

        assert!(pool.is_interested(&css, &index));
        assert!(!pool.is_pending(&css));
        assert_eq!(pool.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_shared_file_across_pages() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let about = page("http://localhost/about.html");
        let pool = pool();

        pool.subscribe(&index, &css);
        pool.subscribe(&about, &css);
        pool.unsubscribe(&index, &css);

        assert!(!pool.is_interested(&css, &index));
        assert!(pool.is_interested(&css, &about));
        assert!(!pool.is_pending(&css));
    }

    #[tokio::test]
    async fn test_subscribe_retries_failed_watch() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();
        pool.subscribe(&index, &css);
        assert!(!pool.has_native_watch(&css));
        pool.unsubscribe(&index, &css);

        std::fs::write(&css, "body {}").unwrap();
        pool.subscribe(&index, &css);

        assert!(pool.has_native_watch(&css));
        assert_eq!(pool.watch_count(), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_unknown_path_is_noop() {
        let pool = pool();
        let index = page("http://localhost/index.html");

        pool.unsubscribe(&index, Path::new("/nowhere/style.css"));

        assert_eq!(pool.watch_count(), 0);
        assert!(!pool.is_pending(Path::new("/nowhere/style.css")));
    }

    #[tokio::test]
    async fn test_failed_watch_still_tracks_interest() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.css");
        let index = page("http://localhost/index.html");
        let pool = pool();

        pool.subscribe(&index, &missing);

        assert!(pool.is_watched(&missing));
        assert!(pool.is_interested(&missing, &index));
    }

    #[tokio::test]
    async fn test_file_change_is_broadcast() {
        let dir = tempfile::tempdir().unwrap();
        let css = site_file(&dir, "style.css");
        let index = page("http://localhost/index.html");
        let pool = pool();
        let mut changes = pool.listen();
        pool.subscribe(&index, &css);

        std::fs::write(&css, "body { color: blue }").unwrap();

        let change = tokio::time::timeout(Duration::from_secs(5), changes.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            change,
            FileChange {
                path: css,
                kind: WatchEventKind::Changed,
            }
        );
    }
}
