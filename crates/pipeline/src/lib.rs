//! Maintenance Pipeline
//!
//! Entry point wiring: configuration, logging, the data stages and batch
//! deployment of the declared dags.

pub mod cli;
pub mod config;
mod logging;
pub mod stages;

pub use cli::{Cli, Command};
pub use config::{PipelineConfig, StorageBackend, StorageFolders};
pub use logging::{init_logging, LogFormat};
pub use stages::{Stage, StageRunner};

use anyhow::{Context, Result};
use batch_deploy::{Deployer, HttpBatchService, ServicePrincipal};
use storage::{AzureCredentials, OpendalStore};
use tracing::info;

/// Execute a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let config = PipelineConfig::load(&cli.pipelines)?;
    info!(
        "Run date {} (previous {}), storage {}",
        config.today, config.yesterday, config.folders.base
    );

    match cli.command {
        Command::Train => run_stage(&config, |runner| runner.run(Stage::Train)),
        Command::Predict => run_stage(&config, |runner| runner.run(Stage::Predict)),
        Command::Task { dag, step } => run_stage(&config, |runner| runner.run_task(&dag, &step)),
        Command::Deploy { dag } => {
            let deployer = deployer(&config)?;
            match dag {
                Some(name) => deployer.deploy(&name, config.dag(&name)?).await?,
                None => deployer.deploy_all(&config.dags).await?,
            }
            Ok(())
        }
        Command::Pool => {
            deployer(&config)?.create_pool().await?;
            Ok(())
        }
    }
}

fn run_stage(
    config: &PipelineConfig,
    stage: impl FnOnce(&StageRunner<'_>) -> Result<()>,
) -> Result<()> {
    let store = open_store(config)?;
    // Store calls block on their own runtime
    tokio::task::block_in_place(|| stage(&StageRunner::new(config, &store)))
}

/// Artifact store for the configured backend
pub fn open_store(config: &PipelineConfig) -> Result<OpendalStore> {
    let store = match config.storage_backend {
        StorageBackend::Local => OpendalStore::local(&config.storage_root)?,
        StorageBackend::Azure => {
            let account_key = std::env::var("AZURE_STORAGE_ACCOUNT_KEY")
                .context("AZURE_STORAGE_ACCOUNT_KEY is required for the azure backend")?;
            OpendalStore::azure(&config.folders.base, &AzureCredentials { account_key })?
        }
    };
    Ok(store)
}

fn deployer(config: &PipelineConfig) -> Result<Deployer<HttpBatchService>> {
    let principal = ServicePrincipal::from_env()?;
    let service = HttpBatchService::new(&config.batch, principal.clone())
        .context("Failed to create batch client")?;
    Ok(Deployer::new(
        service,
        config.batch.clone(),
        principal,
        env!("CARGO_PKG_VERSION"),
    ))
}
