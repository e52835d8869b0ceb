//! WebTransport echo server binary.

use clap::Parser;
use server::cli::Cli;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    common::install_crypto_provider();

    let config = Cli::parse().into_config();

    // Either server stopping takes the whole process down, without draining the other.
    if let Err(e) = server::run(&config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
