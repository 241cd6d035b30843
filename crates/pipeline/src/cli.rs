//! Command Line

use crate::logging::LogFormat;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "maintenance-pipeline", version, about = "Equipment failure prediction pipeline")]
pub struct Cli {
    /// Log filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,

    /// Dag declarations and deployment settings
    #[arg(long, env = "PIPELINES_FILE", default_value = "pipelines.toml", global = true)]
    pub pipelines: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Fit the failure classifier and store it
    Train,
    /// Score the input readings with the stored model
    Predict,
    /// Run one step of a declared dag
    Task { dag: String, step: String },
    /// Submit dags as batch jobs
    Deploy {
        /// Only this dag
        #[arg(long)]
        dag: Option<String>,
    },
    /// Create the batch pool
    Pool,
}
