// ABOUTME: Main application orchestration for the stencil CLI
// ABOUTME: Coordinates between CLI arguments, configuration, and command execution

use anyhow::{anyhow, Result};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use super::commands;
use super::{Args, Commands, Config};

pub struct App {
    config: Config,
}

impl App {
    /// Create a new application instance
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install the tracing subscriber. `RUST_LOG` wins over the configured level.
    pub fn init_logging(&self, verbose: bool, no_color: bool) -> Result<()> {
        let level = if verbose { "debug" } else { self.config.logging.level.as_str() };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        // stdout carries the rendered view
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(!no_color)
            .with_target(false)
            .with_writer(std::io::stderr);

        let installed = if self.config.logging.format == "compact" {
            builder.compact().try_init()
        } else {
            builder.try_init()
        };
        installed.map_err(|e| anyhow!("Failed to initialize logging: {}", e))?;

        debug!("Log level set to {}", level);
        Ok(())
    }

    /// Apply global flags that override configuration
    pub fn apply_overrides(&mut self, args: &Args) {
        if let Some(views) = &args.views {
            self.config.views.views_root = views.clone();
        }
        if let Some(engine) = &args.engine {
            self.config.views.engine = engine.clone();
        }
    }

    /// Run the application with parsed arguments
    pub async fn run(&mut self, args: Args) -> Result<()> {
        self.init_logging(args.verbose, args.no_color)?;

        info!("Starting stencil v{}", env!("CARGO_PKG_VERSION"));
        if let Some(path) = &args.config {
            debug!("Using configuration file {}", path.display());
        }

        self.apply_overrides(&args);

        if let Commands::Render { vars, .. } = &args.command {
            self.config.merge_variables(Args::parse_variables(vars)?);
        }

        match args.command {
            Commands::Render {
                template,
                data,
                layout,
                no_layout,
                output,
                ..
            } => {
                let request = commands::RenderRequest {
                    template,
                    data,
                    layout,
                    no_layout,
                    output,
                };
                commands::render_view(request, &self.config).await
            }

            Commands::Check { template } => commands::check_template(template, &self.config).await,
        }
    }

    /// Create application from command line arguments
    pub async fn from_args(args: &Args) -> Result<Self> {
        let config = Config::load(args.config.clone())?;
        Ok(Self::new(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use std::path::PathBuf;

    #[test]
    fn test_app_creation() {
        let app = App::new(Config::default());
        assert_eq!(app.config().views.engine, "stencil");
    }

    #[test]
    fn test_global_flags_override_config() {
        let args = Args::try_parse_from([
            "stencil",
            "--views",
            "alt/views",
            "--engine",
            "handlebars",
            "check",
            "index",
        ])
        .unwrap();

        let mut app = App::new(Config::default());
        app.apply_overrides(&args);

        assert_eq!(app.config().views.views_root, PathBuf::from("alt/views"));
        assert_eq!(app.config().views.engine, "handlebars");
    }
}
