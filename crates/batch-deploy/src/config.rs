//! Deployment Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A declared pipeline: ordered steps and an optional cron schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dag {
    pub tasks: Vec<String>,
    #[serde(default)]
    pub schedule: Option<String>,
}

/// Batch account, pool and container settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Batch account endpoint
    pub account_url: String,
    /// REST API version sent with every request
    pub api_version: String,
    pub pool_id: String,
    pub vm_size: String,
    /// Cloud service OS family
    pub os_family: String,
    pub dedicated_nodes: u32,
    /// Container registry name (`<name>.azurecr.io`)
    pub registry_name: String,
    /// Image repository inside the registry
    pub app_name: String,
    /// Job ids are `<job_prefix>-<dag>`
    pub job_prefix: String,
    /// Executable invoked by each task inside the container
    pub binary: String,
    /// ISO 8601 duration
    pub max_wall_clock: String,
    pub max_task_retry: i32,
    /// Pause between deleting and re-adding an existing job
    pub recreate_delay_secs: u64,
    pub request_timeout_secs: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            account_url: "https://mlopaesbatch.eastus2.batch.azure.com".to_string(),
            api_version: "2023-05-01.17.0".to_string(),
            pool_id: "batchpool".to_string(),
            vm_size: "Standard_D2_v3".to_string(),
            os_family: "5".to_string(),
            dedicated_nodes: 1,
            registry_name: "54e5ef7c9fb5461ba8e5bfdfb25ddb7d".to_string(),
            app_name: "test".to_string(),
            job_prefix: "test".to_string(),
            binary: "maintenance-pipeline".to_string(),
            max_wall_clock: "PT18H".to_string(),
            max_task_retry: 1,
            recreate_delay_secs: 30,
            request_timeout_secs: 60,
        }
    }
}

impl BatchConfig {
    pub fn registry_server(&self) -> String {
        format!("{}.azurecr.io", self.registry_name)
    }

    /// Fully qualified container image for a release
    pub fn image(&self, version: &str) -> String {
        format!("{}/{}:{}", self.registry_server(), self.app_name, version)
    }

    pub fn job_id(&self, dag: &str) -> String {
        format!("{}-{}", self.job_prefix, dag)
    }

    pub fn recreate_delay(&self) -> Duration {
        Duration::from_secs(self.recreate_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
