#![cfg(not(tarpaulin_include))]

use clap::Parser;
use sped_sheets::app;
use sped_sheets::config::ServerConfig;

/// Main entry point for the web application
///
/// Reads the server configuration from flags and `SHEETS_*` environment
/// variables, sets up logging (`RUST_LOG`, `info` by default) and serves the
/// document, session, saved-file and export endpoints.
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = ServerConfig::parse();
    log::info!("Storing data under {}", config.data_dir.display());

    app::run(config).await
}
