//! Single-file watch primitive.
//!
//! Wraps a native `notify` watcher on one path. Bursts of raw events are
//! coalesced over a short debounce window, then evaluated once: a rename or
//! removal is reported unconditionally, a change only if the file content
//! actually differs from what was last observed.

use std::path::{Path, PathBuf};
use std::time::Duration;

use md5::{Digest, Md5};
use notify::event::{AccessKind, AccessMode, ModifyKind};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Kind of event reported by a [`FileWatch`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum WatchEventKind {
    /// File content differs from the last observed content.
    Changed,
    /// File was renamed, moved away or deleted.
    Renamed,
}

impl WatchEventKind {
    /// Classify a raw `notify` event. Returns `None` for irrelevant kinds.
    fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Some(Self::Renamed),
            EventKind::Create(_)
            | EventKind::Modify(_)
            | EventKind::Access(AccessKind::Close(AccessMode::Write)) => Some(Self::Changed),
            _ => None,
        }
    }

    /// Coalesce two event kinds seen within one debounce window.
    ///
    /// A rename anywhere in the burst wins.
    #[allow(clippy::match_same_arms)]
    fn coalesce(self, new: Self) -> Self {
        use WatchEventKind::{Changed, Renamed};

        match (self, new) {
            (Changed, Changed) => Changed, // Normal debounce
            (Changed, Renamed) => Renamed, // File is gone
            (Renamed, Changed) => Renamed, // Replaced after move, still report the move
            (Renamed, Renamed) => Renamed, // Duplicate
        }
    }
}

/// Remembers the last observed content of a file as an MD5 fingerprint.
#[derive(Debug, Default)]
struct ContentTracker {
    fingerprint: Option<String>,
}

impl ContentTracker {
    /// Decide whether a debounced event should be reported.
    ///
    /// Read failures (file vanished or locked between event and read) are
    /// treated as no-ops.
    async fn evaluate(&mut self, path: &Path, kind: WatchEventKind) -> Option<WatchEventKind> {
        if kind == WatchEventKind::Renamed {
            self.fingerprint = None;
            return Some(kind);
        }

        let content = match tokio::fs::read(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "Skipping unreadable file");
                return None;
            }
        };

        let fingerprint = hex::encode(Md5::digest(&content));
        if self.fingerprint.as_deref() == Some(fingerprint.as_str()) {
            return None;
        }
        self.fingerprint = Some(fingerprint);
        Some(kind)
    }
}

/// Native watch on a single file.
///
/// The debounce task owns the native watcher; dropping the handle aborts the
/// task and with it the watcher.
pub(crate) struct FileWatch {
    path: PathBuf,
    task: JoinHandle<()>,
}

impl FileWatch {
    /// Start watching `path`, invoking `on_event` for each reported event.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the native watcher cannot be created or the path
    /// cannot be watched.
    pub(crate) fn start<F>(path: &Path, debounce: Duration, on_event: F) -> Result<Self, notify::Error>
    where
        F: Fn(WatchEventKind) + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res
                && let Some(kind) = WatchEventKind::from_notify(&event.kind)
            {
                let _ = tx.send(kind);
            }
        })?;
        watcher.watch(path, RecursiveMode::NonRecursive)?;

        let task = tokio::spawn(debounce_events(
            path.to_path_buf(),
            debounce,
            watcher,
            rx,
            on_event,
        ));

        Ok(Self {
            path: path.to_path_buf(),
            task,
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Collapse each burst of raw events into one evaluation.
///
/// After every burst the path is registered again: an atomic save (write a
/// temp file, rename it over the target) leaves the native watch on the old
/// file. While the path is missing, registration is retried once per
/// debounce period, and the file showing up again counts as a change.
async fn debounce_events<W, F>(
    path: PathBuf,
    debounce: Duration,
    mut watcher: W,
    mut rx: mpsc::UnboundedReceiver<WatchEventKind>,
    on_event: F,
) where
    W: Watcher,
    F: Fn(WatchEventKind),
{
    let mut tracker = ContentTracker::default();
    let mut armed = true;

    loop {
        let first = if armed {
            match rx.recv().await {
                Some(kind) => kind,
                None => return,
            }
        } else {
            tokio::select! {
                next = rx.recv() => match next {
                    Some(kind) => kind,
                    None => return,
                },
                () = tokio::time::sleep(debounce) => {
                    armed = rearm(&mut watcher, &path);
                    if !armed {
                        continue;
                    }
                    WatchEventKind::Changed
                }
            }
        };

        let mut kind = first;
        loop {
            match tokio::time::timeout(debounce, rx.recv()).await {
                Ok(Some(next)) => kind = kind.coalesce(next),
                Ok(None) => return,
                Err(_) => break,
            }
        }

        if let Some(event) = tracker.evaluate(&path, kind).await {
            tracing::debug!(path = %path.display(), ?event, "File watch fired");
            on_event(event);
        }

        armed = rearm(&mut watcher, &path);
    }
}

/// Register `path` with `watcher` again, dropping any stale registration.
///
/// Returns `false` while the path cannot be watched (usually: it is gone).
fn rearm<W: Watcher>(watcher: &mut W, path: &Path) -> bool {
    // The old registration may already have been dropped with the old file.
    let _ = watcher.unwatch(path);
    match watcher.watch(path, RecursiveMode::NonRecursive) {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Waiting for file to reappear");
            false
        }
    }
}
