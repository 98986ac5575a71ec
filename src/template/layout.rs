// ABOUTME: Layout composition for rendered views
// ABOUTME: Re-renders a parent layout with the child output bound under the reserved body key

use serde_json::Value as JsonValue;
use tracing::debug;

use super::context::{RenderContext, BODY_KEY};
use super::engine::{LayoutChoice, ViewEngine};
use super::error::{Result, TemplateError};

/// Wrap `body` in the layout selected by `choice`.
///
/// The layout sees the original context plus `body`, and is rendered without
/// any further layout. A layout file that does not exist is skipped and the
/// body is returned as is.
pub(crate) async fn compose(
    engine: &ViewEngine,
    body: String,
    context: &RenderContext<'_>,
    choice: &LayoutChoice,
) -> Result<String> {
    let name = match choice {
        LayoutChoice::Disabled => return Ok(body),
        LayoutChoice::Named(name) => name.as_str(),
        LayoutChoice::Default => match engine.config().default_layout.as_deref() {
            Some(name) => name,
            None => return Ok(body),
        },
    };

    let path = engine.loader().layout_path(name);
    let scope = context.child().with(BODY_KEY, JsonValue::String(body));

    match engine.render_file(&path, &scope).await {
        Err(TemplateError::TemplateNotFound { path }) => {
            debug!("Layout '{}' not found at {}, skipping", name, path.display());
            let body = scope
                .lookup(BODY_KEY)
                .and_then(JsonValue::as_str)
                .unwrap_or_default();
            Ok(body.to_string())
        }
        rendered => rendered,
    }
}
