// ABOUTME: Template resolution and caching for the view engine
// ABOUTME: Maps logical template names to files and memoizes their source or compiled form

use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::debug;

use super::directive::Template;
use super::error::{Result, TemplateError};

/// Cached representation of a template file
#[derive(Debug, Clone)]
pub enum CachedTemplate {
    /// Raw text for delegated backends that compile on their own
    Source(Arc<str>),
    /// Parsed node tree for the native dialect
    Compiled(Arc<Template>),
}

/// Template cache keyed by `(engine, resolved path)`.
///
/// Entries are never replaced once stored: a racing second insert for the same
/// key keeps the first value, which is equivalent since both were read from the
/// same file. The only invalidation is [`TemplateCache::clear`].
#[derive(Debug, Default)]
pub struct TemplateCache {
    enabled: bool,
    entries: DashMap<(String, PathBuf), CachedTemplate>,
}

impl TemplateCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: DashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn get(&self, engine: &str, path: &Path) -> Option<CachedTemplate> {
        if !self.enabled {
            return None;
        }
        self.entries
            .get(&(engine.to_string(), path.to_path_buf()))
            .map(|entry| entry.value().clone())
    }

    /// Store `template` unless an entry already exists, returning the stored value
    pub fn insert(&self, engine: &str, path: &Path, template: CachedTemplate) -> CachedTemplate {
        if !self.enabled {
            return template;
        }
        self.entries
            .entry((engine.to_string(), path.to_path_buf()))
            .or_insert(template)
            .value()
            .clone()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// How a loaded file is turned into a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    Source,
    Compile,
}

/// Resolves template names for one engine and loads them through its cache
#[derive(Debug)]
pub struct TemplateLoader {
    engine: String,
    extension: String,
    views_root: PathBuf,
    layouts_root: PathBuf,
    cache: TemplateCache,
}

impl TemplateLoader {
    pub fn new(
        engine: impl Into<String>,
        extension: impl Into<String>,
        views_root: impl Into<PathBuf>,
        layouts_root: Option<PathBuf>,
        cache: TemplateCache,
    ) -> Self {
        let views_root = views_root.into();
        let layouts_root = layouts_root.unwrap_or_else(|| views_root.join("layouts"));
        Self {
            engine: engine.into(),
            extension: extension.into().trim_start_matches('.').to_string(),
            views_root,
            layouts_root,
            cache,
        }
    }

    pub fn engine(&self) -> &str {
        &self.engine
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn cache(&self) -> &TemplateCache {
        &self.cache
    }

    /// Path of a view, appending the engine extension unless already present
    pub fn view_path(&self, name: &str) -> PathBuf {
        self.views_root.join(self.file_name(name))
    }

    /// Path of a layout under the layouts root
    pub fn layout_path(&self, name: &str) -> PathBuf {
        self.layouts_root.join(self.file_name(name))
    }

    fn file_name(&self, name: &str) -> String {
        let suffix = format!(".{}", self.extension);
        if name.ends_with(&suffix) {
            name.to_string()
        } else {
            format!("{}{}", name, suffix)
        }
    }

    /// Fetch a template, from the cache when possible
    pub async fn load(&self, path: &Path, mode: LoadMode) -> Result<CachedTemplate> {
        if let Some(cached) = self.cache.get(&self.engine, path) {
            debug!("Template cache hit: {}", path.display());
            return Ok(cached);
        }

        if !path.is_file() {
            return Err(TemplateError::TemplateNotFound {
                path: path.to_path_buf(),
            });
        }

        let source = fs::read_to_string(path).await?;
        debug!("Loaded template {} ({} bytes)", path.display(), source.len());

        let template = match mode {
            LoadMode::Source => CachedTemplate::Source(Arc::from(source)),
            LoadMode::Compile => CachedTemplate::Compiled(Arc::new(Template::parse(&source))),
        };

        Ok(self.cache.insert(&self.engine, path, template))
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }
}
