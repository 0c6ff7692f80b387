//! Page-to-resource dependency graph.
//!
//! Every file served for a request is recorded against the page that caused
//! the request (its `Referer`). When a reload channel connects for a page,
//! the recorded set tells the watcher pool which files to watch.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use axum::http::Uri;

/// Normalized page identifier: the origin URL without query string or fragment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct PageKey(String);

impl PageKey {
    /// Normalize a declared origin (usually a `Referer` header value).
    pub(crate) fn from_origin(origin: &str) -> Self {
        let end = origin.find(['?', '#']).unwrap_or(origin.len());
        Self(origin[..end].to_owned())
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the origin is an HTML document rather than another resource.
    pub(crate) fn is_document(&self) -> bool {
        self.0.ends_with(".html")
    }

    /// URL path component of the origin (`/css/site.css` for
    /// `http://localhost:8013/css/site.css`).
    pub(crate) fn url_path(&self) -> Option<String> {
        let uri: Uri = self.0.parse().ok()?;
        Some(uri.path().to_owned())
    }
}

impl fmt::Display for PageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Files loaded per page.
///
/// Entries are never pruned. A page re-populates its entry on the next
/// navigation, and stale entries are simply never read.
#[derive(Debug, Default)]
pub(crate) struct ResourceGraph {
    pages: BTreeMap<PageKey, HashSet<PathBuf>>,
}

impl ResourceGraph {
    /// Record that `page` loaded `file_path`.
    ///
    /// Returns `false` if the file was already recorded for the page.
    pub(crate) fn record_load(&mut self, page: &PageKey, file_path: &Path) -> bool {
        if let Some(files) = self.pages.get_mut(page) {
            return files.insert(file_path.to_path_buf());
        }
        self.pages
            .insert(page.clone(), HashSet::from([file_path.to_path_buf()]));
        true
    }

    /// Attribute `file_path` to the page that loaded `origin_file`.
    ///
    /// Used when a resource was requested by another resource (a stylesheet
    /// importing a font, say). Searches existing entries for a page whose set
    /// contains `origin_file`, preferring HTML documents, and records
    /// `file_path` there as well. Only one hop is resolved per call; deeper
    /// chains get attributed as their loads repeat.
    pub(crate) fn resolve_indirect_owner(
        &mut self,
        origin_file: &Path,
        file_path: &Path,
    ) -> Option<PageKey> {
        let owners = || {
            self.pages
                .iter()
                .filter(|(_, files)| files.contains(origin_file))
                .map(|(page, _)| page)
        };
        let owner = owners()
            .find(|page| page.is_document())
            .or_else(|| owners().next())?
            .clone();

        self.record_load(&owner, file_path);
        Some(owner)
    }

    /// Take the files recorded for `page`, leaving its set empty.
    ///
    /// Each reload connection starts from a clean list so dependencies of an
    /// older version of the page do not leak forward.
    pub(crate) fn take_snapshot_and_reset(&mut self, page: &PageKey) -> HashSet<PathBuf> {
        self.pages.get_mut(page).map(std::mem::take).unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn files(&self, page: &PageKey) -> Option<&HashSet<PathBuf>> {
        self.pages.get(page)
    }
}
