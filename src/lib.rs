// ABOUTME: Main library module for the stencil view renderer
// ABOUTME: Exports the template engine, its configuration and the CLI front end

pub mod cli;
pub mod template;

// Re-export commonly used types
pub use cli::{App, Args, Config};
pub use template::{
    BackendRegistry, DelegatedBackend, LayoutChoice, RenderContext, RenderOptions, Template,
    TemplateError, ViewConfig, ViewEngine,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
