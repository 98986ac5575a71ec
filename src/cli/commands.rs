// ABOUTME: Command implementations for the stencil CLI
// ABOUTME: Handles execution of the render and check commands

use anyhow::{anyhow, bail, Result};
use serde_json::{Map, Value as JsonValue};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

use super::config::Config;
use crate::template::backend::NATIVE_ENGINE;
use crate::template::{LayoutChoice, RenderOptions, Template, ViewEngine};

/// Arguments of the `render` command
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub template: String,
    pub data: Option<PathBuf>,
    pub layout: Option<String>,
    pub no_layout: bool,
    pub output: Option<PathBuf>,
}

impl RenderRequest {
    fn layout_choice(&self) -> LayoutChoice {
        match (&self.layout, self.no_layout) {
            (_, true) => LayoutChoice::Disabled,
            (Some(name), false) => LayoutChoice::Named(name.clone()),
            (None, false) => LayoutChoice::Default,
        }
    }
}

/// Render a view and write it to stdout or the requested file
pub async fn render_view(request: RenderRequest, config: &Config) -> Result<()> {
    let engine = ViewEngine::new(config.views.clone())?;

    let data = match &request.data {
        Some(path) => load_data(path).await?,
        None => JsonValue::Object(Map::new()),
    };

    let mut options = RenderOptions::new();
    options.layout = request.layout_choice();
    for (key, value) in &config.template_vars {
        options.locals.insert(key.clone(), JsonValue::String(value.clone()));
    }

    let rendered = engine
        .render(&request.template, &data, &options)
        .await
        .map_err(|e| anyhow!("Failed to render '{}': {}", request.template, e))?;

    match &request.output {
        Some(output_path) => {
            if let Some(parent) = output_path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            fs::write(output_path, &rendered).await.map_err(|e| {
                anyhow!("Failed to write output file '{}': {}", output_path.display(), e)
            })?;
            info!("Rendered {} characters to {}", rendered.len(), output_path.display());
        }
        None => print!("{}", rendered),
    }

    Ok(())
}

/// Report every malformed directive in a native template
pub async fn check_template(template: String, config: &Config) -> Result<()> {
    if config.views.engine != NATIVE_ENGINE {
        bail!(
            "check only supports {} templates, configured engine is '{}'",
            NATIVE_ENGINE,
            config.views.engine
        );
    }

    let engine = ViewEngine::new(config.views.clone())?;
    let path = engine.loader().view_path(&template);
    let source = fs::read_to_string(&path)
        .await
        .map_err(|e| anyhow!("Failed to read template '{}': {}", path.display(), e))?;

    let parsed = Template::parse(&source);
    if parsed.diagnostics().is_empty() {
        println!("{}: no problems found", path.display());
        return Ok(());
    }

    for diagnostic in parsed.diagnostics() {
        println!("{}:{}", path.display(), diagnostic);
    }
    warn!("{} malformed directives in {}", parsed.diagnostics().len(), path.display());
    bail!("{} malformed directives found", parsed.diagnostics().len())
}

/// Read render data from a JSON or YAML file; the top level must be a map
pub async fn load_data(path: &Path) -> Result<JsonValue> {
    let contents = fs::read_to_string(path)
        .await
        .map_err(|e| anyhow!("Failed to read data file '{}': {}", path.display(), e))?;

    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let data: JsonValue = if is_json {
        serde_json::from_str(&contents)?
    } else {
        serde_yaml::from_str(&contents)?
    };

    if !data.is_object() {
        bail!("Data file '{}' must contain a map at the top level", path.display());
    }
    Ok(data)
}
