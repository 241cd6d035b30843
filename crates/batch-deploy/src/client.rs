//! Batch Service Clients

use crate::auth::{ServicePrincipal, TokenProvider};
use crate::config::BatchConfig;
use crate::payload::{JobSpec, PoolSpec, TaskSpec};
use crate::BatchError;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Mutex;
use tracing::debug;

const CONTENT_TYPE: &str = "application/json; odata=minimalmetadata";

/// Operations the deployer needs from a Batch account
#[async_trait]
pub trait BatchService: Send + Sync {
    async fn add_pool(&self, pool: &PoolSpec) -> Result<(), BatchError>;

    /// Fetch a job; a missing job is an `Api` error with code `JobNotFound`
    async fn get_job(&self, job_id: &str) -> Result<serde_json::Value, BatchError>;

    async fn delete_job(&self, job_id: &str) -> Result<(), BatchError>;

    async fn add_job(&self, job: &JobSpec) -> Result<(), BatchError>;

    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), BatchError>;
}

/// REST client for a Batch account
pub struct HttpBatchService {
    client: reqwest::Client,
    account_url: String,
    api_version: String,
    tokens: TokenProvider,
}

impl HttpBatchService {
    pub fn new(config: &BatchConfig, principal: ServicePrincipal) -> Result<Self, BatchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self {
            tokens: TokenProvider::new(client.clone(), principal),
            client,
            account_url: config.account_url.trim_end_matches('/').to_string(),
            api_version: config.api_version.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}?api-version={}", self.account_url, path, self.api_version)
    }

    async fn request(
        &self,
        method: reqwest::Method,
        path: &str,
    ) -> Result<reqwest::RequestBuilder, BatchError> {
        let token = self.tokens.token().await?;
        Ok(self
            .client
            .request(method, self.url(path))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE))
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, body: &T) -> Result<(), BatchError> {
        let response = self
            .request(reqwest::Method::POST, path)
            .await?
            .body(serde_json::to_vec(body).map_err(|e| BatchError::Config(e.to_string()))?)
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    /// Turn a non-2xx response into an `Api` error carrying the service's error code
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BatchError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(BatchError::Api {
                status: status.as_u16(),
                code: error_code(&body),
                body,
            });
        }
        Ok(response)
    }
}

/// `code` field of a Batch error body
fn error_code(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("code").and_then(|c| c.as_str()).map(str::to_string))
        .unwrap_or_else(|| "Unknown".to_string())
}

#[async_trait]
impl BatchService for HttpBatchService {
    async fn add_pool(&self, pool: &PoolSpec) -> Result<(), BatchError> {
        debug!("POST pools {}", pool.id);
        self.post("pools", pool).await
    }

    async fn get_job(&self, job_id: &str) -> Result<serde_json::Value, BatchError> {
        let response = self
            .request(reqwest::Method::GET, &format!("jobs/{}", job_id))
            .await?
            .send()
            .await?;
        let response = Self::ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), BatchError> {
        let response = self
            .request(reqwest::Method::DELETE, &format!("jobs/{}", job_id))
            .await?
            .send()
            .await?;
        Self::ensure_success(response).await?;
        Ok(())
    }

    async fn add_job(&self, job: &JobSpec) -> Result<(), BatchError> {
        debug!("POST jobs {}", job.id);
        self.post("jobs", job).await
    }

    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), BatchError> {
        self.post(&format!("jobs/{}/tasks", job_id), task).await
    }
}

/// A call received by [`MemoryBatchService`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchCall {
    AddPool(String),
    GetJob(String),
    DeleteJob(String),
    AddJob(JobSpec),
    AddTask { job_id: String, task: TaskSpec },
}

/// In-process Batch account that records every call
#[derive(Default)]
pub struct MemoryBatchService {
    jobs: Mutex<HashSet<String>>,
    calls: Mutex<Vec<BatchCall>>,
    fail_deletes: bool,
}

impl MemoryBatchService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with an existing job
    pub fn with_job(self, job_id: &str) -> Self {
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.insert(job_id.to_string());
        }
        self
    }

    /// Reject every delete with a `JobBeingDeleted` error
    pub fn failing_deletes(mut self) -> Self {
        self.fail_deletes = true;
        self
    }

    pub fn calls(&self) -> Vec<BatchCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn has_job(&self, job_id: &str) -> bool {
        self.jobs.lock().map(|j| j.contains(job_id)).unwrap_or(false)
    }

    fn record(&self, call: BatchCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }

    fn api_error(status: u16, code: &str) -> BatchError {
        BatchError::Api {
            status,
            code: code.to_string(),
            body: String::new(),
        }
    }
}

#[async_trait]
impl BatchService for MemoryBatchService {
    async fn add_pool(&self, pool: &PoolSpec) -> Result<(), BatchError> {
        self.record(BatchCall::AddPool(pool.id.clone()));
        Ok(())
    }

    async fn get_job(&self, job_id: &str) -> Result<serde_json::Value, BatchError> {
        self.record(BatchCall::GetJob(job_id.to_string()));
        if self.has_job(job_id) {
            Ok(serde_json::json!({ "id": job_id, "state": "active" }))
        } else {
            Err(Self::api_error(404, "JobNotFound"))
        }
    }

    async fn delete_job(&self, job_id: &str) -> Result<(), BatchError> {
        self.record(BatchCall::DeleteJob(job_id.to_string()));
        if self.fail_deletes {
            return Err(Self::api_error(409, "JobBeingDeleted"));
        }
        let removed = self.jobs.lock().map(|mut j| j.remove(job_id)).unwrap_or(false);
        if removed {
            Ok(())
        } else {
            Err(Self::api_error(404, "JobNotFound"))
        }
    }

    async fn add_job(&self, job: &JobSpec) -> Result<(), BatchError> {
        self.record(BatchCall::AddJob(job.clone()));
        let inserted = self
            .jobs
            .lock()
            .map(|mut j| j.insert(job.id.clone()))
            .unwrap_or(false);
        if inserted {
            Ok(())
        } else {
            Err(Self::api_error(409, "JobExists"))
        }
    }

    async fn add_task(&self, job_id: &str, task: &TaskSpec) -> Result<(), BatchError> {
        self.record(BatchCall::AddTask {
            job_id: job_id.to_string(),
            task: task.clone(),
        });
        if self.has_job(job_id) {
            Ok(())
        } else {
            Err(Self::api_error(404, "JobNotFound"))
        }
    }
}
