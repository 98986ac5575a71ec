// ABOUTME: View engine configuration consumed from the host application
// ABOUTME: Selects the template dialect, view and layout roots, default layout and caching mode

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::backend::NATIVE_ENGINE;

pub const PRODUCTION_MODE: &str = "production";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    /// Dialect id, `stencil` for the native directive engine
    pub engine: String,

    pub views_root: PathBuf,

    /// Defaults to `<views_root>/layouts`
    pub layouts_root: Option<PathBuf>,

    pub default_layout: Option<String>,

    /// Overrides the mode-derived default when set
    pub cache_enabled: Option<bool>,

    /// Runtime mode, e.g. `development` or `production`
    pub mode: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            engine: NATIVE_ENGINE.to_string(),
            views_root: PathBuf::from("views"),
            layouts_root: None,
            default_layout: None,
            cache_enabled: None,
            mode: "development".to_string(),
        }
    }
}

impl ViewConfig {
    pub fn new(views_root: impl Into<PathBuf>) -> Self {
        Self {
            views_root: views_root.into(),
            ..Self::default()
        }
    }

    pub fn with_engine(mut self, engine: &str) -> Self {
        self.engine = engine.to_string();
        self
    }

    pub fn with_default_layout(mut self, layout: &str) -> Self {
        self.default_layout = Some(layout.to_string());
        self
    }

    pub fn with_cache(mut self, enabled: bool) -> Self {
        self.cache_enabled = Some(enabled);
        self
    }

    pub fn with_mode(mut self, mode: &str) -> Self {
        self.mode = mode.to_string();
        self
    }

    /// Caching is on when configured, otherwise only in production mode
    pub fn cache_enabled(&self) -> bool {
        self.cache_enabled
            .unwrap_or_else(|| self.mode.eq_ignore_ascii_case(PRODUCTION_MODE))
    }

    pub fn layouts_root(&self) -> PathBuf {
        self.layouts_root
            .clone()
            .unwrap_or_else(|| self.views_root.join("layouts"))
    }
}
