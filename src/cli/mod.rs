//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{InspectCommand, ResolveCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Resolve and inspect pipeline variables against a run's context
#[derive(Debug, Parser, Clone)]
#[command(name = "pipeline-engine")]
#[command(author = "Pipeline Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Variable resolution and execution context engine for pipelines", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to engine configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Resolve one variable against a context file
    Resolve(ResolveCommand),

    /// Check every input expression of a pipeline definition
    Validate(ValidateCommand),

    /// Show what a step has published in a context file
    Inspect(InspectCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
