use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::App;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the report
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    App::parse().run().await
}
