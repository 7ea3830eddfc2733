use async_trait::async_trait;
use log::{error, info};
use reqwest::Client;
use serde::Serialize;
use url::Url;

use crate::auth::Token;
use crate::error::{EtlError, Result};

/// Tells the invoking CI job how the run ended.
#[async_trait]
pub trait JobReporter: Send + Sync {
    async fn report_success(&self, job_id: &str, message: &str) -> Result<()>;

    async fn report_failure(&self, job_id: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
enum JobStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Serialize)]
struct JobResultDto<'a> {
    status: JobStatus,
    message: &'a str,
}

/// Posts `{"status": ..., "message": ...}` to `<endpoint>/jobs/<job_id>/result`.
pub struct HttpJobReporter {
    client: Client,
    api_url: Url,
    token: Option<Token>,
}

impl HttpJobReporter {
    pub fn new(base_url: &str, token: Option<Token>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("reportetl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EtlError::Config(format!("Failed to create HTTP client: {e}")))?;

        let api_url = Url::parse(base_url)
            .map_err(|e| EtlError::Config(format!("Invalid report URL: {e}")))?;
        if api_url.cannot_be_a_base() {
            return Err(EtlError::Config(format!(
                "Invalid report URL: {base_url} cannot be a base URL"
            )));
        }

        Ok(Self {
            client,
            api_url,
            token,
        })
    }

    fn auth_request(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(token) = &self.token {
            request.bearer_auth(token.as_str())
        } else {
            request
        }
    }

    fn job_url(&self, job_id: &str) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| EtlError::Config(format!("Invalid report URL: {}", self.api_url)))?
            .pop_if_empty()
            .extend(["jobs", job_id, "result"]);
        Ok(url)
    }

    async fn post(&self, job_id: &str, status: JobStatus, message: &str) -> Result<()> {
        let url = self.job_url(job_id)?;
        let request = self
            .client
            .post(url)
            .json(&JobResultDto { status, message });
        let response = self.auth_request(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EtlError::Reporter(format!(
                "job {job_id}: {status} - {body}"
            )));
        }

        Ok(())
    }
}

#[async_trait]
impl JobReporter for HttpJobReporter {
    async fn report_success(&self, job_id: &str, message: &str) -> Result<()> {
        info!("Reporting success for job {job_id}");
        self.post(job_id, JobStatus::Succeeded, message).await
    }

    async fn report_failure(&self, job_id: &str, message: &str) -> Result<()> {
        info!("Reporting failure for job {job_id}");
        self.post(job_id, JobStatus::Failed, message).await
    }
}

/// Reporter for scheduled runs without a CI endpoint: the log line and the
/// process exit status are the result.
pub struct LogJobReporter;

#[async_trait]
impl JobReporter for LogJobReporter {
    async fn report_success(&self, job_id: &str, message: &str) -> Result<()> {
        info!("Job {job_id} succeeded: {message}");
        Ok(())
    }

    async fn report_failure(&self, job_id: &str, message: &str) -> Result<()> {
        error!("Job {job_id} failed: {message}");
        Ok(())
    }
}
