//! URL path to file system mapping.

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Map a URL path onto a file below `root`.
///
/// The path is percent-decoded and split on `/`. Returns `None` for paths
/// that try to leave the root (`..` segments) or do not decode as UTF-8.
/// The result is not checked for existence.
pub(crate) fn resolve(root: &Path, url_path: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(url_path).decode_utf8().ok()?;

    let mut path = root.to_path_buf();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => return None,
            s if s.contains(['\\', '\0']) => return None,
            s => path.push(s),
        }
    }
    Some(path)
}

/// Whether the file is a source map (`app.js.map`).
pub(crate) fn is_source_map(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "map")
}

/// Whether the file is an HTML document.
pub(crate) fn is_html(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "html")
}

/// `Content-Type` header value for a served file.
///
/// Text-like types carry an explicit UTF-8 charset. Unknown extensions are
/// served as plain text.
pub(crate) fn content_type(path: &Path) -> String {
    if is_source_map(path) {
        return "application/json;charset=utf-8".to_owned();
    }

    let mime = mime_guess::from_path(path).first_or_text_plain();
    let textual = mime.type_() == mime_guess::mime::TEXT
        || matches!(mime.subtype().as_str(), "javascript" | "json" | "xml");
    if textual {
        format!("{}/{};charset=utf-8", mime.type_(), mime.subtype())
    } else {
        mime.essence_str().to_owned()
    }
}
