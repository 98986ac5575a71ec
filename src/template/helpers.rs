// ABOUTME: Handlebars helper functions for the delegated Handlebars backend
// ABOUTME: Implements view helpers whose output follows the native dialect's value formatting

use handlebars::{
    Context, Handlebars, Helper, HelperResult, Output, RenderContext, RenderError,
    RenderErrorReason,
};
use serde_json::Value as JsonValue;

use super::expr::{is_truthy, to_output};

fn missing_param(helper: &str, what: &str) -> RenderError {
    RenderErrorReason::Other(format!("{} helper requires {}", helper, what)).into()
}

/// Uppercase helper
pub fn upper_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .map(|v| to_output(Some(v.value())))
        .ok_or_else(|| missing_param("upper", "an input parameter"))?;

    out.write(&input.to_uppercase())?;
    Ok(())
}

/// Lowercase helper
pub fn lower_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let input = h
        .param(0)
        .map(|v| to_output(Some(v.value())))
        .ok_or_else(|| missing_param("lower", "an input parameter"))?;

    out.write(&input.to_lowercase())?;
    Ok(())
}

/// Join helper - `{{join items ", "}}`, separator defaults to ","
pub fn join_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let items = h
        .param(0)
        .and_then(|v| v.value().as_array())
        .ok_or_else(|| missing_param("join", "an array parameter"))?;
    let separator = h.param(1).and_then(|v| v.value().as_str()).unwrap_or(",");

    let joined = items
        .iter()
        .map(|item| to_output(Some(item)))
        .collect::<Vec<_>>()
        .join(separator);
    out.write(&joined)?;
    Ok(())
}

/// Default helper - writes the fallback when the value is falsy
pub fn default_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|v| v.value());
    let fallback = h
        .param(1)
        .map(|v| v.value())
        .ok_or_else(|| missing_param("default", "a fallback parameter"))?;

    let chosen = if is_truthy(value) {
        value
    } else {
        Some(fallback)
    };
    out.write(&to_output(chosen))?;
    Ok(())
}

/// JSON helper - serializes a value, handy for inline scripts
pub fn json_helper(
    h: &Helper,
    _: &Handlebars,
    _: &Context,
    _rc: &mut RenderContext,
    out: &mut dyn Output,
) -> HelperResult {
    let value = h.param(0).map(|v| v.value()).unwrap_or(&JsonValue::Null);
    let serialized = serde_json::to_string(value)
        .map_err(|e| RenderError::from(RenderErrorReason::Other(e.to_string())))?;
    out.write(&serialized)?;
    Ok(())
}

/// Register all built-in helpers with a Handlebars instance
pub fn register_helpers(handlebars: &mut Handlebars) {
    handlebars.register_helper("upper", Box::new(upper_helper));
    handlebars.register_helper("lower", Box::new(lower_helper));
    handlebars.register_helper("join", Box::new(join_helper));
    handlebars.register_helper("default", Box::new(default_helper));
    handlebars.register_helper("json", Box::new(json_helper));
}
