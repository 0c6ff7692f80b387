//! Per-connection reload subscriptions.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};

use super::graph::PageKey;
use super::pool::{FileChange, WatcherPool};

/// What a freshly connected reload channel should do.
pub(crate) enum Connection {
    /// Nothing is known about the page; tell the tab to reload right away.
    ForceReload,
    /// Nothing is known about the page and forced reloads are disabled.
    Idle,
    /// Watching the files the page loaded.
    Watching(ReloadSubscription),
}

impl Connection {
    /// Wait until the tab should reload.
    ///
    /// Returns `false` if no reload can ever arrive (the change feed closed).
    pub(crate) async fn wait_for_reload(&mut self) -> bool {
        match self {
            Self::ForceReload => true,
            Self::Idle => std::future::pending().await,
            Self::Watching(subscription) => subscription.changed().await,
        }
    }
}

/// Interest of one open connection in a page's files.
///
/// Dropping the subscription releases the interest in every file.
pub(crate) struct ReloadSubscription {
    page: PageKey,
    files: HashSet<PathBuf>,
    pool: Arc<WatcherPool>,
    changes: broadcast::Receiver<FileChange>,
}

impl ReloadSubscription {
    /// Subscribe `page` to each of `files` in the pool.
    pub(crate) fn open(pool: Arc<WatcherPool>, page: PageKey, files: HashSet<PathBuf>) -> Self {
        // Listen before the watches start so no early change is missed.
        let changes = pool.listen();
        for file in &files {
            pool.subscribe(&page, file);
        }
        tracing::debug!(page = %page, files = files.len(), "Reload subscription opened");

        Self {
            page,
            files,
            pool,
            changes,
        }
    }

    /// Wait for a change to one of the subscribed files.
    async fn changed(&mut self) -> bool {
        loop {
            match self.changes.recv().await {
                Ok(change) => {
                    if self.files.contains(&change.path)
                        && self.pool.is_interested(&change.path, &self.page)
                    {
                        tracing::info!(
                            page = %self.page,
                            path = %change.path.display(),
                            kind = ?change.kind,
                            "Reloading page"
                        );
                        return true;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(page = %self.page, skipped, "Change feed lagged, reloading");
                    return true;
                }
                Err(RecvError::Closed) => return false,
            }
        }
    }
}

impl Drop for ReloadSubscription {
    fn drop(&mut self) {
        for file in &self.files {
            self.pool.unsubscribe(&self.page, file);
        }
        tracing::debug!(page = %self.page, "Reload subscription closed");
    }
}
