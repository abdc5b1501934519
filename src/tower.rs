use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::time::sleep;

use crate::error::{check_status, ChatError, Result};
use crate::progress;
use crate::query::EntityType;

pub const DEFAULT_JOB_TEMPLATE_ID: u64 = 5097;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(15);

#[derive(Debug, Clone)]
pub struct TowerConfig {
    pub url: String,
    pub token: String,
    pub job_template_id: u64,
    pub verify_tls: bool,
    pub poll_interval: Duration,
    /// Extra wait after the job finishes so every event reaches the stdout endpoint
    pub settle_delay: Duration,
    pub poll_timeout: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtraVars {
    pub host: String,
    pub entity_type: EntityType,
    pub entity_name: String,
}

#[derive(Debug, Serialize)]
struct LaunchRequest<'a> {
    extra_vars: &'a ExtraVars,
}

#[derive(Debug, Deserialize)]
struct LaunchResponse {
    id: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct JobResponse {
    status: Option<JobStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum JobStatus {
    New,
    Pending,
    Waiting,
    Running,
    Successful,
    Failed,
    Error,
    Canceled,
    Other(String),
}

impl From<String> for JobStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "new" => JobStatus::New,
            "pending" => JobStatus::Pending,
            "waiting" => JobStatus::Waiting,
            "running" => JobStatus::Running,
            "successful" => JobStatus::Successful,
            "failed" => JobStatus::Failed,
            "error" => JobStatus::Error,
            "canceled" => JobStatus::Canceled,
            _ => JobStatus::Other(value),
        }
    }
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Successful | JobStatus::Failed | JobStatus::Error | JobStatus::Canceled
        )
    }

    pub fn is_successful(&self) -> bool {
        *self == JobStatus::Successful
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::New => "new",
            JobStatus::Pending => "pending",
            JobStatus::Waiting => "waiting",
            JobStatus::Running => "running",
            JobStatus::Successful => "successful",
            JobStatus::Failed => "failed",
            JobStatus::Error => "error",
            JobStatus::Canceled => "canceled",
            JobStatus::Other(s) => s,
        };
        f.write_str(s)
    }
}

pub struct TowerClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl TowerClient {
    pub fn new(config: &TowerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .build()?;
        Ok(TowerClient {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    async fn get(&self, url: String) -> Result<reqwest::Response> {
        progress::count(&progress::HTTP_REQUESTS);
        let response = self.http.get(url).bearer_auth(&self.token).send().await?;
        check_status("Ansible Tower", response).await
    }

    pub async fn launch(&self, template_id: u64, extra_vars: &ExtraVars) -> Result<u64> {
        let url = format!(
            "{}/api/v2/job_templates/{}/launch/",
            self.base_url, template_id
        );
        progress::count(&progress::HTTP_REQUESTS);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.token)
            .json(&LaunchRequest { extra_vars })
            .send()
            .await?;
        let launched: LaunchResponse = check_status("Ansible Tower", response).await?.json().await?;
        let job_id = launched.id.ok_or(ChatError::MalformedResponse {
            service: "Ansible Tower",
            field: "id",
        })?;
        progress::count(&progress::JOBS_LAUNCHED);
        tracing::info!(job_id, template_id, "launched job");
        Ok(job_id)
    }

    pub async fn job_status(&self, job_id: u64) -> Result<JobStatus> {
        let url = format!("{}/api/v2/jobs/{}/", self.base_url, job_id);
        let job: JobResponse = self.get(url).await?.json().await?;
        progress::count(&progress::STATUS_POLLS);
        job.status.ok_or(ChatError::MalformedResponse {
            service: "Ansible Tower",
            field: "status",
        })
    }

    pub async fn stdout_html(&self, job_id: u64) -> Result<String> {
        let url = format!("{}/api/v2/jobs/{}/stdout/?format=html", self.base_url, job_id);
        Ok(self.get(url).await?.text().await?)
    }

    /// Polls until the job reaches a terminal status. `on_pending` runs after each
    /// non-terminal poll, before sleeping.
    pub async fn wait_for_job(
        &self,
        job_id: u64,
        interval: Duration,
        timeout: Option<Duration>,
        on_pending: &mut dyn FnMut(&JobStatus),
    ) -> Result<JobStatus> {
        let started = Instant::now();
        loop {
            let status = self.job_status(job_id).await?;
            if status.is_terminal() {
                tracing::info!(job_id, %status, "job finished");
                return Ok(status);
            }
            tracing::debug!(job_id, %status, "job not finished yet");
            if let Some(limit) = timeout {
                if started.elapsed() >= limit {
                    return Err(ChatError::PollTimeout {
                        job_id,
                        waited: started.elapsed(),
                    });
                }
            }
            on_pending(&status);
            sleep(interval).await;
        }
    }
}
