//! Colored terminal output for the trim CLI.

use console::{Style, Term};
use trim_config::{Config, MinifyLevel};

/// Terminal output formatter.
pub(crate) struct Output {
    term: Term,
    red: Style,
    cyan_bold: Style,
}

impl Output {
    /// Create a new output formatter writing to stderr.
    #[must_use]
    pub(crate) fn new() -> Self {
        Self {
            term: Term::stderr(),
            red: Style::new().red(),
            cyan_bold: Style::new().cyan().bold(),
        }
    }

    /// Print the startup banner: listen address highlighted, settings below.
    pub(crate) fn banner(&self, config: &Config) {
        let [address, settings @ ..] = banner_lines(config);
        let _ = self
            .term
            .write_line(&self.cyan_bold.apply_to(address).to_string());
        for line in settings {
            let _ = self.term.write_line(&line);
        }
    }

    /// Print an error message (red).
    pub(crate) fn error(&self, msg: &str) {
        let _ = self.term.write_line(&self.red.apply_to(msg).to_string());
    }
}

fn banner_lines(config: &Config) -> [String; 4] {
    let minify = match config.site_resolved.minify {
        MinifyLevel::Basic => "basic",
        MinifyLevel::More => "more",
    };
    let live_reload = if config.live_reload.enabled {
        "enabled"
    } else {
        "disabled"
    };

    [
        format!(
            "Listening on http://{}:{}",
            config.server.host, config.server.port
        ),
        format!("Serving: {}", config.site_resolved.root_dir.display()),
        format!("Minify: {minify}"),
        format!("Live reload: {live_reload}"),
    ]
}
