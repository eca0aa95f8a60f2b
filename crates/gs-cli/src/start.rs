use anyhow::Result;
use clap::Args;
use gs_core::{Environment, Settings};

/// Arguments for the startup schema check
#[derive(Args)]
pub struct StartArgs {
    /// Target environment (default: $GESTIA_ENV)
    #[arg(long = "env", value_name = "ENV")]
    pub env: Option<Environment>,

    /// Only report applied migrations at debug level
    #[arg(long)]
    pub quiet: bool,
}

impl StartArgs {
    /// Run the startup check. Failures are logged, never propagated, so
    /// the application can still come up on a stale schema.
    pub fn run(self, settings: &Settings) -> Result<()> {
        let environment = self.env.unwrap_or(settings.environment);
        if gs_core::run_on_startup(settings, environment, !self.quiet) {
            println!("{environment}: schema updated");
        } else {
            println!("{environment}: no schema change");
        }
        Ok(())
    }
}
