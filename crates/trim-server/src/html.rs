//! HTML post-processing: reload script injection and minification.

use std::borrow::Cow;

use trim_config::MinifyLevel;

/// Client snippet that reloads the page when the server says so.
pub(crate) const RELOAD_SCRIPT: &str = "<script>{ \
const sse = new EventSource(location.origin + '/livereload'); \
sse.addEventListener('message', () => location.reload()); \
sse.onerror = () => sse.close(); \
window.addEventListener('unload', () => sse.close()); \
}</script>";

const BODY_END: &str = "</body>";

/// Insert [`RELOAD_SCRIPT`] right before the first `</body>`.
///
/// Documents without a closing body tag are returned unchanged.
pub(crate) fn inject_reload_script(html: &str) -> Cow<'_, str> {
    let Some(index) = html.find(BODY_END) else {
        return Cow::Borrowed(html);
    };

    let mut out = String::with_capacity(html.len() + RELOAD_SCRIPT.len());
    out.push_str(&html[..index]);
    out.push_str(RELOAD_SCRIPT);
    out.push_str(&html[index..]);
    Cow::Owned(out)
}

/// HTML minification backend.
pub(crate) trait HtmlMinifier: Send + Sync {
    /// Minify a complete HTML document.
    fn minify(&self, html: &[u8]) -> Vec<u8>;
}

/// [`HtmlMinifier`] backed by the `minify-html` crate.
pub(crate) struct MinifyHtml {
    cfg: minify_html::Cfg,
}

impl MinifyHtml {
    pub(crate) fn new(level: MinifyLevel) -> Self {
        let mut cfg = minify_html::Cfg::new();
        cfg.keep_html_and_head_opening_tags = true;
        cfg.do_not_minify_doctype = true;
        match level {
            MinifyLevel::Basic => {
                cfg.keep_comments = true;
                cfg.keep_closing_tags = true;
            }
            MinifyLevel::More => {
                cfg.keep_comments = false;
                cfg.minify_css = true;
            }
        }
        Self { cfg }
    }
}

impl HtmlMinifier for MinifyHtml {
    fn minify(&self, html: &[u8]) -> Vec<u8> {
        minify_html::minify(html, &self.cfg)
    }
}
