//! Batch Deployment
//!
//! Turns declared pipelines ("dags") into cloud batch jobs:
//! - Pool provisioning
//! - Job (re)creation with a container job manager task
//! - One task per pipeline step, chained linearly
//! - Cron schedule interpretation

mod auth;
mod client;
mod config;
mod deploy;
mod payload;
mod schedule;

pub use auth::{ServicePrincipal, TokenProvider, BATCH_RESOURCE};
pub use client::{BatchCall, BatchService, HttpBatchService, MemoryBatchService};
pub use config::{BatchConfig, Dag};
pub use deploy::Deployer;
pub use payload::{
    AutoUser, CloudServiceConfiguration, ContainerRegistry, ContainerSettings, EnvironmentSetting,
    JobConstraints, JobManagerTask, JobSpec, PoolInfo, PoolSpec, TaskDependencies, TaskSpec, UserIdentity,
};
pub use schedule::{parse_cron, CronSchedule};

use thiserror::Error;

/// Batch deployment errors
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Batch API error ({status}, {code}): {body}")]
    Api {
        status: u16,
        code: String,
        body: String,
    },

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Invalid cron expression {expr}: {reason}")]
    Cron { expr: String, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),
}
