// ABOUTME: Command line argument definitions and parsing using Clap
// ABOUTME: Defines the main CLI structure and subcommands for stencil

use anyhow::anyhow;
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "stencil")]
#[command(about = "Render views written in the stencil directive dialect or Handlebars")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(short, long, global = true, help = "Path to configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Disable colored output")]
    pub no_color: bool,

    #[arg(long, global = true, help = "Views root directory")]
    pub views: Option<PathBuf>,

    #[arg(long, global = true, help = "Template engine (stencil, handlebars)")]
    pub engine: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Render a view to stdout or a file
    Render {
        #[arg(help = "Logical template name, relative to the views root")]
        template: String,

        #[arg(short, long, help = "JSON or YAML file with the render data")]
        data: Option<PathBuf>,

        #[arg(
            short = 'V',
            long = "var",
            help = "Extra string bindings (key=value)"
        )]
        vars: Vec<String>,

        #[arg(short, long, help = "Layout to wrap the view in", conflicts_with = "no_layout")]
        layout: Option<String>,

        #[arg(long, help = "Render without any layout")]
        no_layout: bool,

        #[arg(short, long, help = "Write the output to this file")]
        output: Option<PathBuf>,
    },

    /// Report malformed directives in a stencil template
    Check {
        #[arg(help = "Logical template name, relative to the views root")]
        template: String,
    },
}

impl Args {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Split `key=value` bindings given with `--var`; the value may contain `=`
    pub fn parse_variables(vars: &[String]) -> anyhow::Result<HashMap<String, String>> {
        vars.iter()
            .map(|var| {
                var.split_once('=')
                    .map(|(key, value)| (key.trim().to_string(), value.to_string()))
                    .filter(|(key, _)| !key.is_empty())
                    .ok_or_else(|| anyhow!("Invalid variable '{}', expected key=value", var))
            })
            .collect()
    }
}
