//! Stitch Job
//!
//! A job is one submitted stitching request, tracked by the identifier the
//! server assigned at submission time. Its status only changes through
//! poller observations.

use std::fmt::Display;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    /// Completed and Failed are terminal: no further transitions occur.
    #[allow(unused)]
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl FromStr for JobStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            // Older deployments of the service report "processing".
            "running" | "processing" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            _ => Err(()),
        }
    }
}

impl Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Running => write!(f, "running"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One status observation for a job, as reported by the server.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub status: JobStatus,
    /// Server-supplied failure message, only meaningful when status is Failed.
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Job {
    /// Server-assigned job identifier, unique per submission.
    pub id: String,
    pub status: JobStatus,
    /// Present iff the job failed.
    pub error: Option<String>,
}

impl Job {
    /// A freshly submitted job; the server starts it out pending.
    pub fn new(id: String) -> Self {
        Job {
            id,
            status: JobStatus::Pending,
            error: None,
        }
    }

    /// Apply a poller observation to this job.
    pub fn observe(&mut self, report: &StatusReport) {
        self.status = report.status;
        if report.status == JobStatus::Failed {
            self.error = report.error.clone();
        }
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Job {}: {}", self.id, self.status)
    }
}
