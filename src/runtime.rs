//! Stitch Runtime
//!
//! Wires one submission end-to-end: submit the two inputs, poll the job to a
//! terminal state, download the result into the session's result slot, then
//! refresh the listings. The flow reports progress as events over a bounded
//! channel and honors a broadcast shutdown signal.

use crate::api::error::StitchError;
use crate::api::JobApi;
use crate::consts::runtime::EVENT_QUEUE_SIZE;
use crate::events::{Event, EventType};
use crate::listings::Listings;
use crate::poller::{poll_job, PollOutcome};
use crate::resources::{ResourceHandle, ResourceTracker};
use log::{debug, warn};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

/// One client session: the API connection, the listings, the session-owned
/// files, and the marker that decides which job is the current one.
pub struct Session {
    api: Arc<dyn JobApi>,
    poll_interval: Duration,
    max_attempts: u32,
    tracker: ResourceTracker,
    listings: Listings,
    /// Id of the submission this session currently cares about. A poll loop
    /// whose job no longer matches discards its outcome instead of touching
    /// the result slot.
    current_job: Arc<Mutex<Option<String>>>,
    event_sender: mpsc::Sender<Event>,
}

impl Session {
    pub fn new(
        api: Arc<dyn JobApi>,
        poll_interval: Duration,
        max_attempts: u32,
    ) -> Result<(Self, mpsc::Receiver<Event>), std::io::Error> {
        let (event_sender, event_receiver) = mpsc::channel::<Event>(EVENT_QUEUE_SIZE);
        let session = Self {
            api,
            poll_interval,
            max_attempts,
            tracker: ResourceTracker::new()?,
            listings: Listings::new(),
            current_job: Arc::new(Mutex::new(None)),
            event_sender,
        };
        Ok((session, event_receiver))
    }

    pub fn listings(&self) -> &Listings {
        &self.listings
    }

    /// Path of the current stitch result, if one is live.
    pub fn result_path(&self) -> Option<&Path> {
        self.tracker.result()
    }

    /// Best-effort refresh of both listings; failures are logged, never
    /// propagated.
    pub async fn refresh_listings(&mut self) {
        self.listings.refresh(self.api.as_ref()).await;
        let _ = self
            .event_sender
            .send(Event::listings(
                format!(
                    "listings refreshed ({} recent, {} popular)",
                    self.listings.recent().len(),
                    self.listings.popular().len()
                ),
                EventType::Status,
            ))
            .await;
    }

    /// Run one stitch end-to-end. Returns the minted result handle, or
    /// `None` when the flow was cancelled or superseded by a newer
    /// submission.
    pub async fn stitch(
        &mut self,
        first: &Path,
        second: &Path,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<Option<ResourceHandle>, StitchError> {
        // Local preview copies of the selected inputs, one slot each.
        self.tracker.acquire_from_file("first-preview", first)?;
        self.tracker.acquire_from_file("second-preview", second)?;

        let _ = self
            .event_sender
            .send(Event::submitter(
                format!(
                    "submitting {} + {}",
                    first.display(),
                    second.display()
                ),
                EventType::Status,
            ))
            .await;

        let job = self.api.submit(first, second).await?;
        *self.current_job.lock().unwrap() = Some(job.id.clone());
        let _ = self
            .event_sender
            .send(Event::submitter(
                format!("job {} accepted", job.id),
                EventType::Success,
            ))
            .await;

        self.track_to_result(job, &mut shutdown).await
    }

    /// Poll the given job and, if it completes and is still current, mint
    /// the result and refresh the listings.
    async fn track_to_result(
        &mut self,
        mut job: crate::job::Job,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Option<ResourceHandle>, StitchError> {
        let outcome = poll_job(
            self.api.as_ref(),
            &mut job,
            self.poll_interval,
            self.max_attempts,
            &self.event_sender,
            shutdown,
        )
        .await?;

        if outcome == PollOutcome::Cancelled {
            return Ok(None);
        }

        if !self.is_current(&job.id) {
            warn!("discarding result of superseded job {}", job.id);
            let _ = self
                .event_sender
                .send(Event::poller(
                    format!("job {} superseded, result discarded", job.id),
                    EventType::Warning,
                ))
                .await;
            return Ok(None);
        }

        let bytes = self.api.download(&job.id).await?;
        let _ = self
            .event_sender
            .send(Event::downloader(
                format!("downloaded {} bytes for job {}", bytes.len(), job.id),
                EventType::Success,
            ))
            .await;
        let handle = self.tracker.replace_result(&bytes)?;
        debug!("{} live session files after result swap", self.tracker.live_count());

        self.refresh_listings().await;
        Ok(Some(handle))
    }

    /// Re-fetch the stored output of a completed job by id. Downloads are
    /// idempotent; this can be invoked any number of times.
    pub async fn fetch_existing(&mut self, job_id: &str) -> Result<ResourceHandle, StitchError> {
        let bytes = self.api.download(job_id).await?;
        let _ = self
            .event_sender
            .send(Event::downloader(
                format!("downloaded {} bytes for job {}", bytes.len(), job_id),
                EventType::Success,
            ))
            .await;
        let handle = self.tracker.replace_result(&bytes)?;
        self.refresh_listings().await;
        Ok(handle)
    }

    fn is_current(&self, job_id: &str) -> bool {
        self.current_job.lock().unwrap().as_deref() == Some(job_id)
    }

    /// Session teardown: release every session-owned file. Dropping the
    /// session closes the event channel.
    pub fn finish(mut self) {
        self.tracker.release_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockApi, ScriptedStatus};
    use crate::job::{Job, JobStatus};
    use crate::listings::{PopularEntry, RecentEntry};
    use std::fs;
    use std::sync::atomic::Ordering;

    const INTERVAL: Duration = Duration::from_millis(5000);

    fn write_inputs(dir: &tempfile::TempDir) -> (std::path::PathBuf, std::path::PathBuf) {
        let first = dir.path().join("first.mp4");
        let second = dir.path().join("second.mp4");
        fs::write(&first, b"first clip").unwrap();
        fs::write(&second, b"second clip").unwrap();
        (first, second)
    }

    fn completed_script() -> Vec<ScriptedStatus> {
        vec![
            ScriptedStatus::status(JobStatus::Pending),
            ScriptedStatus::status(JobStatus::Running),
            ScriptedStatus::status(JobStatus::Running),
            ScriptedStatus::status(JobStatus::Completed),
        ]
    }

    fn sample_recent() -> Vec<RecentEntry> {
        vec![RecentEntry {
            filename: "first.mp4".to_string(),
            timestamp: 1_700_000_000.0,
            task_id: "j1".to_string(),
        }]
    }

    fn sample_popular() -> Vec<PopularEntry> {
        vec![PopularEntry {
            output_filename: "output_j1.mp4".to_string(),
            downloads: 4,
            id: "j1".to_string(),
        }]
    }

    #[tokio::test(start_paused = true)]
    async fn full_flow_mints_result_and_refreshes_listings() {
        let api = Arc::new(
            MockApi::new("j1")
                .with_statuses(completed_script())
                .with_download(b"stitched output")
                .with_recent(sample_recent())
                .with_popular(sample_popular()),
        );
        let (mut session, _events) = Session::new(api.clone(), INTERVAL, 60).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = write_inputs(&dir);

        let handle = session
            .stitch(&first, &second, shutdown_rx)
            .await
            .unwrap()
            .expect("flow should produce a result");

        assert_eq!(fs::read(handle.path()).unwrap(), b"stitched output");
        assert_eq!(session.listings().recent().len(), 1);
        assert_eq!(session.listings().popular().len(), 1);
        assert_eq!(api.download_calls.load(Ordering::Relaxed), 1);
        assert_eq!(api.recent_calls.load(Ordering::Relaxed), 1);
        assert_eq!(api.popular_calls.load(Ordering::Relaxed), 1);
        assert_eq!(session.result_path(), Some(handle.path()));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_leaves_no_result_and_no_refresh() {
        let api = Arc::new(MockApi::new("j1").with_statuses(
            std::iter::repeat_with(|| ScriptedStatus::status(JobStatus::Running)).take(60),
        ));
        let (mut session, mut events) = Session::new(api.clone(), INTERVAL, 60).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = write_inputs(&dir);

        // Drain events concurrently so the poller's 60 progress sends never
        // block on a full channel.
        let drain = tokio::spawn(async move { while events.recv().await.is_some() {} });

        let result = session.stitch(&first, &second, shutdown_rx).await;

        assert!(matches!(result, Err(StitchError::Timeout { attempts: 60 })));
        assert!(session.result_path().is_none());
        assert_eq!(api.download_calls.load(Ordering::Relaxed), 0);
        assert_eq!(api.recent_calls.load(Ordering::Relaxed), 0);
        assert_eq!(api.popular_calls.load(Ordering::Relaxed), 0);

        session.finish();
        drain.await.unwrap();
    }

    #[tokio::test]
    async fn failed_job_stops_before_download() {
        let api = Arc::new(
            MockApi::new("j1").with_statuses([ScriptedStatus::failed(Some("codec mismatch"))]),
        );
        let (mut session, _events) = Session::new(api.clone(), INTERVAL, 60).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = write_inputs(&dir);

        let result = session.stitch(&first, &second, shutdown_rx).await;

        match result {
            Err(StitchError::TaskFailed(msg)) => assert_eq!(msg, "codec mismatch"),
            other => panic!("expected TaskFailed, got {:?}", other.map(|_| ())),
        }
        assert_eq!(api.download_calls.load(Ordering::Relaxed), 0);
        assert!(session.result_path().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn listing_refresh_failure_does_not_change_stitch_outcome() {
        let api = Arc::new(
            MockApi::new("j1")
                .with_statuses(completed_script())
                .with_download(b"stitched output")
                .failing_recent()
                .failing_popular(),
        );
        let (mut session, _events) = Session::new(api, INTERVAL, 60).unwrap();
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = write_inputs(&dir);

        let handle = session.stitch(&first, &second, shutdown_rx).await.unwrap();

        assert!(handle.is_some(), "refresh failure must not fail the stitch");
        assert!(session.listings().recent().is_empty());
        assert!(session.listings().popular().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn sequential_stitches_keep_one_live_result() {
        let api = Arc::new(
            MockApi::new("j1")
                .with_statuses([
                    ScriptedStatus::status(JobStatus::Completed),
                    ScriptedStatus::status(JobStatus::Completed),
                    ScriptedStatus::status(JobStatus::Completed),
                ])
                .with_download(b"bytes"),
        );
        let (mut session, _events) = Session::new(api, INTERVAL, 60).unwrap();
        let (shutdown_tx, _) = broadcast::channel(1);
        let dir = tempfile::tempdir().unwrap();
        let (first, second) = write_inputs(&dir);

        let mut handles = Vec::new();
        for _ in 0..3 {
            let handle = session
                .stitch(&first, &second, shutdown_tx.subscribe())
                .await
                .unwrap()
                .unwrap();
            handles.push(handle);
        }

        // Only the newest result file survives.
        assert!(!handles[0].path().exists());
        assert!(!handles[1].path().exists());
        assert!(handles[2].path().exists());
        assert_eq!(session.result_path(), Some(handles[2].path()));
    }

    #[tokio::test]
    async fn superseded_job_result_is_discarded() {
        let api = Arc::new(
            MockApi::new("old-job")
                .with_statuses([ScriptedStatus::status(JobStatus::Completed)])
                .with_download(b"stale bytes"),
        );
        let (mut session, _events) = Session::new(api.clone(), INTERVAL, 60).unwrap();
        let (_shutdown_tx, mut shutdown_rx) = broadcast::channel(1);

        // A newer submission owns the session by the time this loop finishes.
        *session.current_job.lock().unwrap() = Some("newer-job".to_string());
        let job = Job::new("old-job".to_string());

        let outcome = session.track_to_result(job, &mut shutdown_rx).await.unwrap();

        assert!(outcome.is_none());
        assert_eq!(api.download_calls.load(Ordering::Relaxed), 0);
        assert!(session.result_path().is_none());
    }

    #[tokio::test]
    async fn refetching_a_completed_job_is_idempotent() {
        let api = Arc::new(MockApi::new("j1").with_download(b"same bytes every time"));
        let (mut session, _events) = Session::new(api.clone(), INTERVAL, 60).unwrap();

        let first = session.fetch_existing("j1").await.unwrap();
        let first_bytes = fs::read(first.path()).unwrap();
        let second = session.fetch_existing("j1").await.unwrap();
        let second_bytes = fs::read(second.path()).unwrap();

        assert_eq!(first_bytes, second_bytes);
        assert_eq!(api.download_calls.load(Ordering::Relaxed), 2);
        // The refetched result replaced the earlier one in the single slot.
        assert!(!first.path().exists());
        assert!(second.path().exists());
    }
}
