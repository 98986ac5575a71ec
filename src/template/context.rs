// ABOUTME: Render context management for template expansion
// ABOUTME: Provides layered binding scopes where child scopes shadow their parents without mutating them

use serde_json::{Map, Value as JsonValue};

use super::error::{Result, TemplateError};

/// Reserved binding that carries a rendered child body into its layout.
pub const BODY_KEY: &str = "body";

/// A scope of named bindings, optionally layered over a parent scope.
///
/// Lookups walk from the innermost scope outwards, so a child binding hides a
/// parent binding of the same name. Children only ever hold a shared borrow of
/// their parent, which keeps the parent untouched once the child is dropped.
#[derive(Debug, Clone, Default)]
pub struct RenderContext<'a> {
    bindings: Map<String, JsonValue>,
    parent: Option<&'a RenderContext<'a>>,
}

impl RenderContext<'static> {
    /// Create a root context from an owned map of bindings
    pub fn new(bindings: Map<String, JsonValue>) -> Self {
        Self {
            bindings,
            parent: None,
        }
    }

    /// Create a root context from caller data, which must be a JSON object
    pub fn from_json(data: &JsonValue) -> Result<Self> {
        match data {
            JsonValue::Object(map) => Ok(Self::new(map.clone())),
            JsonValue::Null => Ok(Self::default()),
            other => Err(TemplateError::InvalidContext(format!(
                "render data must be an object, got {}",
                json_type_name(other)
            ))),
        }
    }
}

impl<'a> RenderContext<'a> {
    /// Open a child scope layered over this one
    pub fn child(&self) -> RenderContext<'_> {
        RenderContext {
            bindings: Map::new(),
            parent: Some(self),
        }
    }

    /// Add or replace a binding in this scope only
    pub fn set(&mut self, key: impl Into<String>, value: JsonValue) {
        self.bindings.insert(key.into(), value);
    }

    /// Builder form of [`RenderContext::set`]
    pub fn with(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        self.set(key, value);
        self
    }

    /// Add every entry of `bindings` to this scope
    pub fn extend(&mut self, bindings: Map<String, JsonValue>) {
        self.bindings.extend(bindings);
    }

    /// Resolve a top-level binding, innermost scope first
    pub fn lookup(&self, key: &str) -> Option<&JsonValue> {
        let mut scope = Some(self);
        while let Some(current) = scope {
            if let Some(value) = current.bindings.get(key) {
                return Some(value);
            }
            scope = current.parent;
        }
        None
    }

    /// Flatten every visible binding into one JSON object for delegated backends
    pub fn to_json(&self) -> JsonValue {
        let mut chain = Vec::new();
        let mut scope = Some(self);
        while let Some(current) = scope {
            chain.push(current);
            scope = current.parent;
        }

        let mut merged = Map::new();
        for current in chain.into_iter().rev() {
            for (key, value) in &current.bindings {
                merged.insert(key.clone(), value.clone());
            }
        }
        JsonValue::Object(merged)
    }
}

pub(crate) fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}
