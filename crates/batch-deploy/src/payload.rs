//! Batch REST Payloads
//!
//! Request bodies for pool, job and task creation, plus the builders that
//! fill them from deployment settings.

use crate::auth::ServicePrincipal;
use crate::config::{BatchConfig, Dag};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudServiceConfiguration {
    pub os_family: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolSpec {
    pub id: String,
    pub vm_size: String,
    pub cloud_service_configuration: CloudServiceConfiguration,
    pub target_dedicated_nodes: u32,
}

impl PoolSpec {
    pub fn from_config(config: &BatchConfig) -> Self {
        Self {
            id: config.pool_id.clone(),
            vm_size: config.vm_size.clone(),
            cloud_service_configuration: CloudServiceConfiguration {
                os_family: config.os_family.clone(),
            },
            target_dedicated_nodes: config.dedicated_nodes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRegistry {
    pub registry_server: String,
    pub user_name: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSettings {
    pub image_name: String,
    pub registry: ContainerRegistry,
    pub working_directory: String,
}

impl ContainerSettings {
    /// Release image pulled with the service principal's credentials
    pub fn new(config: &BatchConfig, principal: &ServicePrincipal, version: &str) -> Self {
        Self {
            image_name: config.image(version),
            registry: ContainerRegistry {
                registry_server: config.registry_server(),
                user_name: principal.client_id.clone(),
                password: principal.client_secret.clone(),
            },
            working_directory: "containerImageDefault".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSetting {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoUser {
    pub scope: String,
    pub elevation_level: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub auto_user: AutoUser,
}

impl UserIdentity {
    /// Task-scoped auto-user with admin elevation
    pub fn task_admin() -> Self {
        Self {
            auto_user: AutoUser {
                scope: "task".to_string(),
                elevation_level: "admin".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependencies {
    pub task_ids: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobManagerTask {
    pub id: String,
    pub display_name: String,
    pub command_line: String,
    pub container_settings: ContainerSettings,
    pub environment_settings: Vec<EnvironmentSetting>,
    pub kill_job_on_completion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolInfo {
    pub pool_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobConstraints {
    pub max_wall_clock_time: String,
    pub max_task_retry_count: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub id: String,
    pub pool_info: PoolInfo,
    pub uses_task_dependencies: bool,
    pub job_manager_task: JobManagerTask,
    pub constraints: JobConstraints,
}

impl JobSpec {
    /// Job for one dag, with a container job manager that only announces itself
    pub fn new(
        dag: &str,
        config: &BatchConfig,
        principal: &ServicePrincipal,
        version: &str,
    ) -> Self {
        Self {
            id: config.job_id(dag),
            pool_info: PoolInfo {
                pool_id: config.pool_id.clone(),
            },
            uses_task_dependencies: true,
            job_manager_task: JobManagerTask {
                id: "mlops-manager-task".to_string(),
                display_name: "MLOps Job Manager Task".to_string(),
                command_line: "echo 'Running Container'".to_string(),
                container_settings: ContainerSettings::new(config, principal, version),
                environment_settings: principal.environment(),
                kill_job_on_completion: false,
            },
            constraints: JobConstraints {
                max_wall_clock_time: config.max_wall_clock.clone(),
                max_task_retry_count: config.max_task_retry,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSpec {
    pub id: String,
    pub display_name: String,
    pub command_line: String,
    pub container_settings: ContainerSettings,
    pub environment_settings: Vec<EnvironmentSetting>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<TaskDependencies>,
    pub user_identity: UserIdentity,
}

impl TaskSpec {
    /// One task per step; each step depends on the one before it
    pub fn chain(
        dag_name: &str,
        dag: &Dag,
        config: &BatchConfig,
        principal: &ServicePrincipal,
        version: &str,
    ) -> Vec<Self> {
        let container = ContainerSettings::new(config, principal, version);
        let environment = principal.environment();

        dag.tasks
            .iter()
            .enumerate()
            .map(|(i, step)| Self {
                id: step.clone(),
                display_name: format!("Test Task {}", step),
                command_line: format!("'{} task {} {}'", config.binary, dag_name, step),
                container_settings: container.clone(),
                environment_settings: environment.clone(),
                depends_on: i.checked_sub(1).map(|prev| TaskDependencies {
                    task_ids: vec![dag.tasks[prev].clone()],
                }),
                user_identity: UserIdentity::task_admin(),
            })
            .collect()
    }
}
