//! Kolosal AutoTab - command-line entry point

use clap::Parser;
use kolosal_autotab::cli::{run, Cli};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kolosal_autotab=info".into()),
        )
        .init();

    run(Cli::parse())
}
