use anyhow::Result;
use gs_cli::{Cli, Parser};

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.tracing_level())
        .with_writer(std::io::stderr)
        .init();

    cli.run()
}
