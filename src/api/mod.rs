//! Stitch Service API
//!
//! A client for the video stitching service: job submission, status polling,
//! result download, and the recent/popular listings.

pub mod client;
pub mod error;

use crate::job::{Job, StatusReport};
use crate::listings::{PopularEntry, RecentEntry};
use error::StitchError;
use std::path::Path;

pub use client::StitchApiClient;

/// The operations the flow needs from the stitching service. The HTTP client
/// implements this; tests drive the flow against a scripted implementation.
#[async_trait::async_trait]
pub trait JobApi: Send + Sync {
    /// Submit two input videos for stitching. Returns the created job.
    async fn submit(&self, first: &Path, second: &Path) -> Result<Job, StitchError>;

    /// Fetch the current status of a job.
    async fn job_status(&self, job_id: &str) -> Result<StatusReport, StitchError>;

    /// Download the stitched output of a completed job as opaque bytes.
    /// Safe to call more than once; the server serves the same bytes.
    async fn download(&self, job_id: &str) -> Result<Vec<u8>, StitchError>;

    /// Fetch the most recently submitted jobs.
    async fn recent(&self) -> Result<Vec<RecentEntry>, StitchError>;

    /// Fetch the most downloaded jobs.
    async fn popular(&self) -> Result<Vec<PopularEntry>, StitchError>;
}
