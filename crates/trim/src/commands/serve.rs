//! `trim` serve command implementation.

use std::path::PathBuf;

use clap::Args;
use trim_config::{CliSettings, Config, MinifyLevel};
use trim_server::{run_server, server_config_from_config};

use crate::error::CliError;
use crate::output::Output;

/// Arguments for serving a directory.
#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Directory to serve (overrides config, default: current directory).
    #[arg(value_name = "WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// Enable more aggressive HTML minification (drop comments, minify CSS).
    #[arg(short = 'm', long, visible_alias = "minify")]
    minify_more: bool,

    /// Path to configuration file (default: auto-discover trim.toml).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Host to bind to (overrides config).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind to (overrides config).
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable verbose output (request and live reload logs).
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable live reload.
    #[arg(long)]
    no_live_reload: bool,
}

impl ServeArgs {
    /// Execute the serve command.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration fails or the server fails to start.
    pub(crate) async fn execute(self) -> Result<(), CliError> {
        let output = Output::new();

        let cli_settings = self.cli_settings()?;
        let config = Config::load(self.config.as_deref(), Some(&cli_settings))?;

        let root_dir = &config.site_resolved.root_dir;
        if !root_dir.is_dir() {
            return Err(CliError::Validation(format!(
                "Not a directory: {}",
                root_dir.display()
            )));
        }

        output.banner(&config);

        let server_config = server_config_from_config(&config);
        run_server(server_config)
            .await
            .map_err(|e| CliError::Server(e.to_string()))?;

        Ok(())
    }

    /// Build config overrides from the command line.
    fn cli_settings(&self) -> Result<CliSettings, CliError> {
        let root_dir = match &self.work_dir {
            Some(dir) if dir.is_absolute() => Some(dir.clone()),
            Some(dir) => Some(std::env::current_dir()?.join(dir)),
            None => None,
        };

        Ok(CliSettings {
            host: self.host.clone(),
            port: self.port,
            root_dir,
            minify: self.minify_more.then_some(MinifyLevel::More),
            live_reload_enabled: self.no_live_reload.then_some(false),
        })
    }
}
