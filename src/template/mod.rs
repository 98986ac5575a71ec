// ABOUTME: View rendering module for the native directive dialect and delegated engines
// ABOUTME: Provides template loading, caching, directive expansion and layout composition

pub mod backend;
pub mod config;
pub mod context;
pub mod directive;
pub mod engine;
pub mod error;
pub mod expr;
pub mod helpers;
mod layout;
pub mod loader;

pub use backend::{BackendRegistry, DelegatedBackend, HandlebarsBackend};
pub use config::ViewConfig;
pub use context::{RenderContext, BODY_KEY};
pub use directive::{escape_html, Diagnostic, Template};
pub use engine::{LayoutChoice, RenderOptions, ViewEngine};
pub use error::{Result, TemplateError};
pub use loader::{TemplateCache, TemplateLoader};
