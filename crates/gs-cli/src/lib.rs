//! GESTIA CLI library

pub mod db;
pub mod start;

use std::path::PathBuf;

// Re-export CLI types for testing
pub use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "gestia")]
#[command(about = "GESTIA appliance tracking - database tooling")]
#[command(version, author, long_about = None)]
pub struct Cli {
    /// Directory holding data/<environment>/gestia.db (default: $GESTIA_HOME or .)
    #[arg(long, global = true, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Schema migration commands
    Db {
        #[command(subcommand)]
        subcommand: db::DbCommands,
    },
    /// Run the startup schema check the application performs at launch
    Start(start::StartArgs),
}

impl Cli {
    /// Tracing level selected by `--log-level`.
    pub fn tracing_level(&self) -> tracing::Level {
        match self.log_level.to_ascii_lowercase().as_str() {
            "error" => tracing::Level::ERROR,
            "warn" => tracing::Level::WARN,
            "info" => tracing::Level::INFO,
            "debug" => tracing::Level::DEBUG,
            "trace" => tracing::Level::TRACE,
            _ => tracing::Level::INFO,
        }
    }

    /// Execute the parsed command.
    pub fn run(self) -> anyhow::Result<()> {
        let settings = gs_core::Settings::from_env()?;
        let settings = match self.root {
            Some(root) => settings.with_root(root),
            None => settings,
        };

        match self.command {
            Commands::Db { subcommand } => subcommand.run(&settings),
            Commands::Start(args) => args.run(&settings),
        }
    }
}
