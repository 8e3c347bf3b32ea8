//! Stitch Service Client
//!
//! HTTP client for the video stitching service, allowing job submission,
//! status polling, result download, and listing retrieval.

use crate::api::error::StitchError;
use crate::api::JobApi;
use crate::environment::Environment;
use crate::job::{Job, JobStatus, StatusReport};
use crate::listings::{PopularEntry, RecentEntry};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Submission response; the job identifier is the only field the client needs.
#[derive(Deserialize)]
struct JobDescriptor {
    #[serde(default)]
    id: String,
}

/// Raw status response. Only the `status` field is authoritative; `error`
/// accompanies failed jobs.
#[derive(Deserialize)]
struct RawStatus {
    status: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StitchApiClient {
    client: Client,
    environment: Environment,
}

impl StitchApiClient {
    /// Create a new client for the given environment.
    ///
    /// Only the connection is bounded by a timeout; uploads and downloads of
    /// video payloads run as long as the transfer takes.
    pub fn new(environment: Environment) -> Self {
        Self {
            client: ClientBuilder::new()
                .connect_timeout(Duration::from_secs(10))
                .build()
                .expect("Failed to create HTTP client"),
            environment,
        }
    }

    /// Get a reference to the environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    fn build_url(&self, endpoint: &str) -> String {
        format!(
            "{}/{}",
            self.environment.api_url().trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn file_part(path: &Path) -> Result<Part, StitchError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "input.mp4".to_string());
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| StitchError::Protocol(format!("invalid mime type: {}", e)))?;
        Ok(part)
    }

    fn parse_status(job_id: &str, raw: RawStatus) -> Result<StatusReport, StitchError> {
        let status_str = raw.status.ok_or_else(|| {
            StitchError::Protocol(format!("status response for job {} has no status field", job_id))
        })?;
        let status: JobStatus = status_str.parse().map_err(|_| {
            StitchError::Protocol(format!(
                "unknown status {:?} for job {}",
                status_str, job_id
            ))
        })?;
        Ok(StatusReport {
            status,
            error: raw.error,
        })
    }
}

#[async_trait::async_trait]
impl JobApi for StitchApiClient {
    /// Submit both input videos as one multipart request. A non-success
    /// response is a hard failure; no job identifier is ever guessed.
    async fn submit(&self, first: &Path, second: &Path) -> Result<Job, StitchError> {
        let form = Form::new()
            .part("wwe_video", Self::file_part(first).await?)
            .part("fan_video", Self::file_part(second).await?);

        let response = self
            .client
            .post(self.build_url("stitch-videos/"))
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StitchError::submission_from_response(response).await);
        }

        let body = response.text().await?;
        let descriptor: JobDescriptor = serde_json::from_str(&body)
            .map_err(|e| StitchError::Protocol(format!("unparseable submission response: {}", e)))?;
        if descriptor.id.is_empty() {
            return Err(StitchError::Protocol(
                "submission response carries no job id".to_string(),
            ));
        }

        Ok(Job::new(descriptor.id))
    }

    async fn job_status(&self, job_id: &str) -> Result<StatusReport, StitchError> {
        let response = self
            .client
            .get(self.build_url(&format!("task-status/{}", job_id)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StitchError::Protocol(format!(
                "status check for job {} returned {}",
                job_id,
                response.status()
            )));
        }

        let body = response.text().await?;
        let raw: RawStatus = serde_json::from_str(&body)
            .map_err(|e| StitchError::Protocol(format!("unparseable status response: {}", e)))?;
        Self::parse_status(job_id, raw)
    }

    /// The body is opaque bytes; the server owns the output format.
    async fn download(&self, job_id: &str) -> Result<Vec<u8>, StitchError> {
        let response = self
            .client
            .get(self.build_url(&format!("download-video/{}", job_id)))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StitchError::download_from_response(response).await);
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn recent(&self) -> Result<Vec<RecentEntry>, StitchError> {
        let response = self
            .client
            .get(self.build_url("recent-videos/"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StitchError::Protocol(format!(
                "recent listing returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| StitchError::Protocol(format!("unparseable recent listing: {}", e)))
    }

    async fn popular(&self) -> Result<Vec<PopularEntry>, StitchError> {
        let response = self
            .client
            .get(self.build_url("popular-videos/"))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StitchError::Protocol(format!(
                "popular listing returned {}",
                response.status()
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|e| StitchError::Protocol(format!("unparseable popular listing: {}", e)))
    }
}
