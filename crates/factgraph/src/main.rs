use anyhow::Result;
use clap::Parser;

use factgraph::cli::{Cli, Commands};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Extract { files } => factgraph::cli::extract::run(&cli.global, &files),
        Commands::Collection { files, resolve } => {
            factgraph::cli::collection::run(&cli.global, &files, resolve)
        }
        Commands::Config => factgraph::cli::config::run(&cli.global),
    }
}
