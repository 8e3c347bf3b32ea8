//! Recent / popular listings.
//!
//! Read-only projections of historical jobs. Each listing is replaced
//! wholesale from one server response, so the displayed list is always a
//! consistent snapshot and never a mix of two refreshes.

use crate::api::error::StitchError;
use crate::api::JobApi;
use log::warn;
use serde::Deserialize;

/// One recently submitted job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecentEntry {
    pub filename: String,
    /// Submission time, seconds since the Unix epoch.
    pub timestamp: f64,
    /// Usable to re-fetch this job's output.
    pub task_id: String,
}

/// One frequently downloaded job.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PopularEntry {
    pub output_filename: String,
    pub downloads: u64,
    /// Usable to re-fetch this job's output.
    pub id: String,
}

/// The two auxiliary read views, refreshed at session start and after every
/// successful stitch. Refreshes are best-effort: a failed fetch keeps the
/// previous snapshot and is logged, never surfaced to the submitting caller.
#[derive(Debug, Default)]
pub struct Listings {
    recent: Vec<RecentEntry>,
    popular: Vec<PopularEntry>,
}

impl Listings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn recent(&self) -> &[RecentEntry] {
        &self.recent
    }

    pub fn popular(&self) -> &[PopularEntry] {
        &self.popular
    }

    /// Refresh both listings. The two fetches are independent; a failure in
    /// one does not block the other.
    pub async fn refresh(&mut self, api: &dyn JobApi) {
        if let Err(e) = self.refresh_recent(api).await {
            warn!("recent listing refresh failed: {}", e);
        }
        if let Err(e) = self.refresh_popular(api).await {
            warn!("popular listing refresh failed: {}", e);
        }
    }

    async fn refresh_recent(&mut self, api: &dyn JobApi) -> Result<(), StitchError> {
        self.recent = api.recent().await?;
        Ok(())
    }

    async fn refresh_popular(&mut self, api: &dyn JobApi) -> Result<(), StitchError> {
        self.popular = api.popular().await?;
        Ok(())
    }
}
