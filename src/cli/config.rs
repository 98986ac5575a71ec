// ABOUTME: Configuration management for the stencil application
// ABOUTME: Handles loading and merging configuration from files and environment variables

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::template::ViewConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub views: ViewConfig,

    /// Bindings added to every render
    #[serde(default)]
    pub template_vars: HashMap<String, String>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    /// Read the YAML file at `path`, or the first one found in the usual
    /// places, then apply `STENCIL_*` environment overrides
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let mut config = match path.or_else(Self::find_config_file) {
            Some(path) if path.exists() => {
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file '{}'", path.display()))?;
                serde_yaml::from_str(&contents)
                    .with_context(|| format!("Invalid config file '{}'", path.display()))?
            }
            _ => Config::default(),
        };

        config.merge_env()?;
        Ok(config)
    }

    /// `~/.stencil/config.yaml` first, then the working directory
    fn find_config_file() -> Option<PathBuf> {
        let home = dirs::home_dir().map(|home| home.join(".stencil").join("config.yaml"));
        let local = ["stencil.yaml", "stencil.yml", ".stencil.yaml", ".stencil.yml"]
            .into_iter()
            .map(PathBuf::from);

        home.into_iter().chain(local).find(|candidate| candidate.exists())
    }

    /// Merge environment variables into configuration
    fn merge_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("STENCIL_ENV") {
            self.views.mode = mode;
        }
        if let Some(engine) = lookup("STENCIL_ENGINE") {
            self.views.engine = engine;
        }
        if let Some(root) = lookup("STENCIL_VIEWS") {
            self.views.views_root = PathBuf::from(root);
        }
        if let Some(root) = lookup("STENCIL_LAYOUTS") {
            self.views.layouts_root = Some(PathBuf::from(root));
        }
        if let Some(layout) = lookup("STENCIL_DEFAULT_LAYOUT") {
            self.views.default_layout = Some(layout);
        }
        if let Some(cache) = lookup("STENCIL_CACHE") {
            let enabled = cache
                .parse::<bool>()
                .with_context(|| format!("STENCIL_CACHE must be true or false, got '{}'", cache))?;
            self.views.cache_enabled = Some(enabled);
        }

        if let Some(level) = lookup("STENCIL_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(format) = lookup("STENCIL_LOG_FORMAT") {
            self.logging.format = format;
        }

        Ok(())
    }

    /// Merge additional variables into template variables
    pub fn merge_variables(&mut self, vars: HashMap<String, String>) {
        self.template_vars.extend(vars);
    }
}
