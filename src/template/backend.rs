// ABOUTME: Rendering backends for the view engine
// ABOUTME: Defines the delegated backend capability, the built-in Handlebars backend and the dialect registry

use async_trait::async_trait;
use handlebars::Handlebars;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use super::error::{Result, TemplateError};
use super::helpers;

/// Dialect id of the built-in directive engine
pub const NATIVE_ENGINE: &str = "stencil";
pub const NATIVE_EXTENSION: &str = "html";

pub const HANDLEBARS_ENGINE: &str = "handlebars";
pub const HANDLEBARS_EXTENSION: &str = "hbs";

/// A third-party template engine supplied by the host.
///
/// The view engine loads the file (honouring its cache) and hands over the
/// source together with the flattened render data.
#[async_trait]
pub trait DelegatedBackend: Send + Sync {
    async fn render(&self, path: &Path, source: &str, data: &JsonValue) -> Result<String>;
}

/// The backend selected for a dialect
#[derive(Clone)]
pub enum Backend {
    Native,
    Delegated(Arc<dyn DelegatedBackend>),
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Backend::Native => f.write_str("Native"),
            Backend::Delegated(_) => f.write_str("Delegated"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendEntry {
    pub extension: String,
    pub backend: Backend,
}

/// Dialects known to a view engine, keyed by engine id
#[derive(Debug, Clone, Default)]
pub struct BackendRegistry {
    entries: HashMap<String, BackendEntry>,
}

impl BackendRegistry {
    /// An empty registry; `stencil` is always resolvable regardless
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the native dialect and Handlebars
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            HANDLEBARS_ENGINE,
            HANDLEBARS_EXTENSION,
            Arc::new(HandlebarsBackend::new()),
        );
        registry
    }

    /// Register a host-supplied dialect, replacing any previous one with that id
    pub fn register(
        &mut self,
        engine: &str,
        extension: &str,
        backend: Arc<dyn DelegatedBackend>,
    ) -> &mut Self {
        self.entries.insert(
            engine.to_string(),
            BackendEntry {
                extension: extension.trim_start_matches('.').to_string(),
                backend: Backend::Delegated(backend),
            },
        );
        self
    }

    pub fn resolve(&self, engine: &str) -> Result<BackendEntry> {
        if engine == NATIVE_ENGINE {
            return Ok(BackendEntry {
                extension: NATIVE_EXTENSION.to_string(),
                backend: Backend::Native,
            });
        }
        self.entries
            .get(engine)
            .cloned()
            .ok_or_else(|| TemplateError::UnsupportedEngine(engine.to_string()))
    }

    pub fn engines(&self) -> Vec<&str> {
        let mut engines: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        engines.push(NATIVE_ENGINE);
        engines.sort_unstable();
        engines
    }
}

/// Delegated backend rendering Handlebars templates
#[derive(Clone)]
pub struct HandlebarsBackend {
    handlebars: Handlebars<'static>,
}

impl HandlebarsBackend {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(false);
        handlebars.set_dev_mode(false);
        helpers::register_helpers(&mut handlebars);
        Self { handlebars }
    }
}

impl Default for HandlebarsBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DelegatedBackend for HandlebarsBackend {
    async fn render(&self, path: &Path, source: &str, data: &JsonValue) -> Result<String> {
        self.handlebars.render_template(source, data).map_err(|e| {
            TemplateError::Backend(format!("{}: {}", path.display(), e))
        })
    }
}
