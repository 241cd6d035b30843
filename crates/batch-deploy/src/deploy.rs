//! Pipeline Deployment

use crate::auth::ServicePrincipal;
use crate::client::BatchService;
use crate::config::{BatchConfig, Dag};
use crate::payload::{JobSpec, PoolSpec, TaskSpec};
use crate::schedule::parse_cron;
use crate::BatchError;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Deploys declared pipelines onto a Batch account
pub struct Deployer<S: BatchService> {
    service: S,
    config: BatchConfig,
    principal: ServicePrincipal,
    version: String,
}

impl<S: BatchService> Deployer<S> {
    /// `version` selects the container image tag
    pub fn new(
        service: S,
        config: BatchConfig,
        principal: ServicePrincipal,
        version: impl Into<String>,
    ) -> Self {
        Self {
            service,
            config,
            principal,
            version: version.into(),
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Provision the pool
    pub async fn create_pool(&self) -> Result<(), BatchError> {
        let pool = PoolSpec::from_config(&self.config);
        info!(
            "Creating pool {} ({} x {})",
            pool.id, pool.target_dedicated_nodes, pool.vm_size
        );
        self.service.add_pool(&pool).await
    }

    /// Add a job, replacing any job with the same id
    pub async fn submit_job(&self, job: &JobSpec) -> Result<(), BatchError> {
        match self.recreate_job(job).await {
            Ok(()) => Ok(()),
            Err(BatchError::Api { code, .. }) => {
                warn!("{}", code);
                info!("Adding job {}", job.id);
                self.service.add_job(job).await
            }
            Err(e) => Err(e),
        }
    }

    async fn recreate_job(&self, job: &JobSpec) -> Result<(), BatchError> {
        self.service.get_job(&job.id).await?;
        self.service.delete_job(&job.id).await?;
        tokio::time::sleep(self.config.recreate_delay()).await;
        info!("Recreating job {}", job.id);
        self.service.add_job(job).await
    }

    /// Add one task per step, each depending on the previous one
    pub async fn add_tasks(
        &self,
        job_id: &str,
        dag_name: &str,
        dag: &Dag,
    ) -> Result<usize, BatchError> {
        let tasks = TaskSpec::chain(dag_name, dag, &self.config, &self.principal, &self.version);
        for task in &tasks {
            info!("Adding task: {}", task.id);
            self.service.add_task(job_id, task).await?;
        }
        Ok(tasks.len())
    }

    /// Submit the job and tasks for one dag
    pub async fn deploy(&self, dag_name: &str, dag: &Dag) -> Result<(), BatchError> {
        if dag.tasks.is_empty() {
            return Err(BatchError::Config(format!("dag {} has no tasks", dag_name)));
        }
        if let Some(expr) = &dag.schedule {
            let schedule = parse_cron(expr, &Utc::now())?;
            info!(
                "Dag {} next runs at {} and every {}s after",
                dag_name,
                schedule.next,
                schedule.recurrence.num_seconds()
            );
        }

        let job = JobSpec::new(dag_name, &self.config, &self.principal, &self.version);
        info!("Deploying dag {} as job {} ({})", dag_name, job.id, self.config.image(&self.version));
        self.submit_job(&job).await?;
        let n_tasks = self.add_tasks(&job.id, dag_name, dag).await?;
        info!("Dag {} deployed with {} tasks", dag_name, n_tasks);
        Ok(())
    }

    /// Deploy every dag in name order
    pub async fn deploy_all(&self, dags: &BTreeMap<String, Dag>) -> Result<(), BatchError> {
        for (name, dag) in dags {
            self.deploy(name, dag).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{BatchCall, MemoryBatchService};
    use std::time::Duration;

    fn principal() -> ServicePrincipal {
        ServicePrincipal {
            client_id: "client".into(),
            client_secret: "secret".into(),
            tenant_id: "tenant".into(),
        }
    }

    fn deployer(service: MemoryBatchService) -> Deployer<MemoryBatchService> {
        let config = BatchConfig {
            recreate_delay_secs: 0,
            ..BatchConfig::default()
        };
        Deployer::new(service, config, principal(), "0.1.0")
    }

    fn dag(tasks: &[&str]) -> Dag {
        Dag {
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            schedule: None,
        }
    }

    fn call_kinds(calls: &[BatchCall]) -> Vec<&'static str> {
        calls
            .iter()
            .map(|c| match c {
                BatchCall::AddPool(_) => "add_pool",
                BatchCall::GetJob(_) => "get_job",
                BatchCall::DeleteJob(_) => "delete_job",
                BatchCall::AddJob(_) => "add_job",
                BatchCall::AddTask { .. } => "add_task",
            })
            .collect()
    }

    #[tokio::test]
    async fn test_new_job_is_added_after_lookup_fails() {
        let deployer = deployer(MemoryBatchService::new());
        deployer.deploy("train", &dag(&["train"])).await.unwrap();

        let calls = deployer.service().calls();
        assert_eq!(call_kinds(&calls), ["get_job", "add_job", "add_task"]);
        assert!(deployer.service().has_job("test-train"));
    }

    #[tokio::test]
    async fn test_existing_job_is_recreated() {
        let deployer = deployer(MemoryBatchService::new().with_job("test-daily"));
        deployer.deploy("daily", &dag(&["predict"])).await.unwrap();

        let calls = deployer.service().calls();
        assert_eq!(
            call_kinds(&calls),
            ["get_job", "delete_job", "add_job", "add_task"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recreate_waits_for_delete_to_settle() {
        let deployer = Deployer::new(
            MemoryBatchService::new().with_job("test-daily"),
            BatchConfig::default(),
            principal(),
            "0.1.0",
        );
        let started = tokio::time::Instant::now();
        deployer.deploy("daily", &dag(&["predict"])).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(deployer.service().has_job("test-daily"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_job_skips_recreate_delay() {
        let deployer = Deployer::new(
            MemoryBatchService::new(),
            BatchConfig::default(),
            principal(),
            "0.1.0",
        );
        let started = tokio::time::Instant::now();
        deployer.deploy("train", &dag(&["train"])).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_failed_delete_falls_back_to_add() {
        let service = MemoryBatchService::new()
            .with_job("test-daily")
            .failing_deletes();
        let deployer = deployer(service);
        let err = deployer.deploy("daily", &dag(&["predict"])).await.unwrap_err();

        // The job still exists, so the fallback add is rejected
        assert!(matches!(err, BatchError::Api { ref code, .. } if code == "JobExists"));
        assert_eq!(
            call_kinds(&deployer.service().calls()),
            ["get_job", "delete_job", "add_job"]
        );
    }

    #[tokio::test]
    async fn test_tasks_are_chained() {
        let deployer = deployer(MemoryBatchService::new());
        deployer
            .deploy("weekly", &dag(&["extract", "train", "publish"]))
            .await
            .unwrap();

        let tasks: Vec<TaskSpec> = deployer
            .service()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                BatchCall::AddTask { job_id, task } => {
                    assert_eq!(job_id, "test-weekly");
                    Some(task)
                }
                _ => None,
            })
            .collect();
        let ids: Vec<&str> = tasks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, ["extract", "train", "publish"]);
        assert_eq!(
            tasks[2].depends_on.as_ref().map(|d| d.task_ids.clone()),
            Some(vec!["train".to_string()])
        );
    }

    #[tokio::test]
    async fn test_deploy_all_in_name_order() {
        let deployer = deployer(MemoryBatchService::new());
        let mut dags = BTreeMap::new();
        dags.insert("train".to_string(), dag(&["train"]));
        dags.insert("daily".to_string(), dag(&["predict"]));
        deployer.deploy_all(&dags).await.unwrap();

        let jobs: Vec<String> = deployer
            .service()
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                BatchCall::AddJob(job) => Some(job.id),
                _ => None,
            })
            .collect();
        assert_eq!(jobs, ["test-daily", "test-train"]);
    }

    #[tokio::test]
    async fn test_invalid_schedule_rejected_before_submit() {
        let deployer = deployer(MemoryBatchService::new());
        let mut bad = dag(&["train"]);
        bad.schedule = Some("whenever".into());

        assert!(matches!(
            deployer.deploy("train", &bad).await,
            Err(BatchError::Cron { .. })
        ));
        assert!(deployer.service().calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_dag_rejected() {
        let deployer = deployer(MemoryBatchService::new());
        assert!(matches!(
            deployer.deploy("empty", &dag(&[])).await,
            Err(BatchError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_create_pool() {
        let deployer = deployer(MemoryBatchService::new());
        deployer.create_pool().await.unwrap();
        assert_eq!(
            deployer.service().calls(),
            vec![BatchCall::AddPool("batchpool".to_string())]
        );
    }
}
