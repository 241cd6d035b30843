//! Maintenance Pipeline - Main Entry Point

use clap::Parser;
use pipeline::{init_logging, run, Cli};
use tracing::{debug, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // `.env` may set LOG_LEVEL and LOG_FORMAT
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format)?;

    info!("=== Maintenance Pipeline v{} ===", env!("CARGO_PKG_VERSION"));
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }
    run(cli).await
}
