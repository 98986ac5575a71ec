// ABOUTME: Public view rendering entry point
// ABOUTME: Loads a template, dispatches it to the configured backend and wraps the result in a layout

use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use tracing::{debug, info};

use super::backend::{Backend, BackendRegistry};
use super::config::ViewConfig;
use super::context::RenderContext;
use super::directive::Template;
use super::error::{Result, TemplateError};
use super::layout;
use super::loader::{CachedTemplate, LoadMode, TemplateCache, TemplateLoader};

/// Which layout, if any, wraps a rendered view
#[derive(Debug, Clone, Default, PartialEq)]
pub enum LayoutChoice {
    /// Use the configured default layout, if there is one
    #[default]
    Default,
    Named(String),
    Disabled,
}

/// Per-call render options
#[derive(Debug, Clone, Default)]
pub struct RenderOptions {
    pub layout: LayoutChoice,
    /// Extra bindings layered over the render data
    pub locals: Map<String, JsonValue>,
}

impl RenderOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_layout(mut self, name: &str) -> Self {
        self.layout = LayoutChoice::Named(name.to_string());
        self
    }

    pub fn without_layout(mut self) -> Self {
        self.layout = LayoutChoice::Disabled;
        self
    }

    pub fn with_local(mut self, key: &str, value: JsonValue) -> Self {
        self.locals.insert(key.to_string(), value);
        self
    }
}

/// A configured view engine.
///
/// Each instance owns its template cache, so independently configured
/// engines can live side by side. The engine is `Send + Sync` and is meant to
/// be shared behind an `Arc` by concurrent requests.
#[derive(Debug)]
pub struct ViewEngine {
    config: ViewConfig,
    backend: Backend,
    loader: TemplateLoader,
}

impl ViewEngine {
    /// Create an engine with the built-in dialects
    pub fn new(config: ViewConfig) -> Result<Self> {
        Self::with_registry(config, &BackendRegistry::with_builtins())
    }

    /// Create an engine whose dialect is looked up in `registry`
    pub fn with_registry(config: ViewConfig, registry: &BackendRegistry) -> Result<Self> {
        let entry = registry.resolve(&config.engine)?;
        let cache = TemplateCache::new(config.cache_enabled());

        info!(
            "View engine '{}' serving {} (cache {})",
            config.engine,
            config.views_root.display(),
            if cache.is_enabled() { "on" } else { "off" }
        );

        let loader = TemplateLoader::new(
            config.engine.clone(),
            entry.extension,
            config.views_root.clone(),
            Some(config.layouts_root()),
            cache,
        );

        Ok(Self {
            config,
            backend: entry.backend,
            loader,
        })
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    /// Render the view `name` with `data`, applying the requested layout
    pub async fn render(
        &self,
        name: &str,
        data: &JsonValue,
        options: &RenderOptions,
    ) -> Result<String> {
        let mut context = RenderContext::from_json(data)?;
        context.extend(options.locals.clone());

        let path = self.loader.view_path(name);
        debug!("Rendering view '{}' from {}", name, path.display());

        let body = self.render_file(&path, &context).await?;
        layout::compose(self, body, &context, &options.layout).await
    }

    /// Render inline native source without the loader, cache or layouts
    pub fn render_string(&self, source: &str, data: &JsonValue) -> Result<String> {
        let context = RenderContext::from_json(data)?;
        Ok(Template::parse(source).render(&context))
    }

    /// Drop every cached template
    pub fn clear_cache(&self) {
        debug!("Clearing {} cached templates", self.loader.cache().len());
        self.loader.clear_cache();
    }

    /// Load one file and run it through the backend, without layout handling
    pub(crate) async fn render_file(
        &self,
        path: &Path,
        context: &RenderContext<'_>,
    ) -> Result<String> {
        match &self.backend {
            Backend::Native => match self.loader.load(path, LoadMode::Compile).await? {
                CachedTemplate::Compiled(template) => Ok(template.render(context)),
                CachedTemplate::Source(source) => Ok(Template::parse(&source).render(context)),
            },
            Backend::Delegated(backend) => match self.loader.load(path, LoadMode::Source).await? {
                CachedTemplate::Source(source) => {
                    backend.render(path, &source, &context.to_json()).await
                }
                CachedTemplate::Compiled(_) => Err(TemplateError::Backend(format!(
                    "{} is cached as a native template",
                    path.display()
                ))),
            },
        }
    }
}
