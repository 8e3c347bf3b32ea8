//! Status Poller
//!
//! Tracks one submitted job to a terminal state. The loop is an explicit
//! state machine driven from the outside: each `Polling` iteration performs
//! exactly one status fetch, emits a derived progress estimate, and waits a
//! fixed interval. The attempt budget bounds the wall-clock time a job may
//! stay non-terminal; cancellation is checked at the top of every iteration
//! and raced against every wait.

use crate::api::error::StitchError;
use crate::api::JobApi;
use crate::consts::poller::{GENERIC_FAILURE, PROGRESS_CAP};
use crate::events::{Event, EventType};
use crate::job::{Job, JobStatus};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    Submitted,
    Polling { attempts: u32 },
    Completed,
    Failed { message: String },
    TimedOut,
}

#[derive(Debug, PartialEq, Eq)]
pub enum PollOutcome {
    /// The job reached terminal success.
    Completed,
    /// The session asked the loop to stop. Not an error; no result exists.
    Cancelled,
}

/// Completion percentage derived from polling attempts. The server reports
/// no ground truth, so the estimate is attempts spent against the budget,
/// capped below 100 until a terminal state is confirmed.
pub fn progress_estimate(attempts: u32, max_attempts: u32) -> u8 {
    if max_attempts == 0 {
        return PROGRESS_CAP;
    }
    let pct = (attempts as u64 * 100 / max_attempts as u64) as u8;
    pct.min(PROGRESS_CAP)
}

/// Drive `job` to a terminal state.
///
/// Returns `Ok(Completed)` on terminal success, `Ok(Cancelled)` when the
/// shutdown channel fires, and an error otherwise. A malformed status
/// response aborts the loop immediately: retrying on malformed data risks
/// an infinite loop with no progress signal.
pub async fn poll_job(
    api: &dyn JobApi,
    job: &mut Job,
    poll_interval: Duration,
    max_attempts: u32,
    event_sender: &mpsc::Sender<Event>,
    shutdown: &mut broadcast::Receiver<()>,
) -> Result<PollOutcome, StitchError> {
    let mut state = PollState::Submitted;
    loop {
        state = match state {
            PollState::Submitted => PollState::Polling { attempts: 0 },

            PollState::Polling { attempts } => {
                if shutdown.try_recv().is_ok() {
                    let _ = event_sender
                        .send(Event::poller(
                            format!("polling cancelled for job {}", job.id),
                            EventType::Shutdown,
                        ))
                        .await;
                    return Ok(PollOutcome::Cancelled);
                }

                let report = api.job_status(&job.id).await?;
                job.observe(&report);

                match report.status {
                    JobStatus::Completed => PollState::Completed,
                    JobStatus::Failed => PollState::Failed {
                        message: report
                            .error
                            .clone()
                            .filter(|m| !m.trim().is_empty())
                            .unwrap_or_else(|| GENERIC_FAILURE.to_string()),
                    },
                    JobStatus::Pending | JobStatus::Running => {
                        let attempts = attempts + 1;
                        let pct = progress_estimate(attempts, max_attempts);
                        let _ = event_sender
                            .send(Event::poller_progress(
                                format!("job {} {} ({}%)", job.id, report.status, pct),
                                pct,
                            ))
                            .await;

                        if attempts >= max_attempts {
                            PollState::TimedOut
                        } else {
                            tokio::select! {
                                _ = tokio::time::sleep(poll_interval) => {
                                    PollState::Polling { attempts }
                                }
                                _ = shutdown.recv() => {
                                    let _ = event_sender
                                        .send(Event::poller(
                                            format!("polling cancelled for job {}", job.id),
                                            EventType::Shutdown,
                                        ))
                                        .await;
                                    return Ok(PollOutcome::Cancelled);
                                }
                            }
                        }
                    }
                }
            }

            PollState::Completed => {
                let _ = event_sender
                    .send(Event::poller(
                        format!("job {} completed", job.id),
                        EventType::Success,
                    ))
                    .await;
                return Ok(PollOutcome::Completed);
            }

            PollState::Failed { message } => {
                let _ = event_sender
                    .send(Event::poller(
                        format!("job {} failed: {}", job.id, message),
                        EventType::Error,
                    ))
                    .await;
                return Err(StitchError::TaskFailed(message));
            }

            PollState::TimedOut => {
                let _ = event_sender
                    .send(Event::poller(
                        format!("job {} gave no terminal status within budget", job.id),
                        EventType::Error,
                    ))
                    .await;
                return Err(StitchError::Timeout {
                    attempts: max_attempts,
                });
            }
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::{MockApi, ScriptedStatus};

    const FAST: Duration = Duration::from_millis(5000);

    fn channels() -> (
        mpsc::Sender<Event>,
        mpsc::Receiver<Event>,
        broadcast::Sender<()>,
        broadcast::Receiver<()>,
    ) {
        let (event_tx, event_rx) = mpsc::channel(100);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        (event_tx, event_rx, shutdown_tx, shutdown_rx)
    }

    fn drain_progress(rx: &mut mpsc::Receiver<Event>) -> Vec<u8> {
        let mut pcts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let Some(pct) = event.progress {
                pcts.push(pct);
            }
        }
        pcts
    }

    #[test]
    fn progress_estimate_is_capped() {
        assert_eq!(progress_estimate(0, 60), 0);
        assert_eq!(progress_estimate(30, 60), 50);
        assert_eq!(progress_estimate(57, 60), 95);
        assert_eq!(progress_estimate(58, 60), 95);
        assert_eq!(progress_estimate(60, 60), 95);
        assert_eq!(progress_estimate(5, 0), PROGRESS_CAP);
    }

    #[tokio::test(start_paused = true)]
    async fn reaches_completed_and_reports_monotonic_progress() {
        let api = MockApi::new("j1").with_statuses([
            ScriptedStatus::status(JobStatus::Pending),
            ScriptedStatus::status(JobStatus::Running),
            ScriptedStatus::status(JobStatus::Running),
            ScriptedStatus::status(JobStatus::Completed),
        ]);
        let (event_tx, mut event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let outcome = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Completed);
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(api.status_calls.load(std::sync::atomic::Ordering::Relaxed), 4);

        let pcts = drain_progress(&mut event_rx);
        assert_eq!(pcts.len(), 3);
        assert!(pcts.windows(2).all(|w| w[0] <= w[1]), "progress regressed");
        assert!(pcts.iter().all(|&p| p <= PROGRESS_CAP));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_times_out() {
        let api = MockApi::new("j1").with_statuses(
            std::iter::repeat_with(|| ScriptedStatus::status(JobStatus::Running)).take(60),
        );
        let (event_tx, mut event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let result = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx).await;

        assert!(matches!(result, Err(StitchError::Timeout { attempts: 60 })));
        assert_eq!(
            api.status_calls.load(std::sync::atomic::Ordering::Relaxed),
            60
        );
        let pcts = drain_progress(&mut event_rx);
        assert!(pcts.iter().all(|&p| p <= PROGRESS_CAP));
    }

    #[tokio::test]
    async fn failed_job_surfaces_server_message() {
        let api = MockApi::new("j1")
            .with_statuses([ScriptedStatus::failed(Some("codec mismatch"))]);
        let (event_tx, _event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let result = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx).await;

        match result {
            Err(StitchError::TaskFailed(msg)) => assert_eq!(msg, "codec mismatch"),
            other => panic!("expected TaskFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn failed_job_without_message_gets_generic_one() {
        let api = MockApi::new("j1").with_statuses([ScriptedStatus::failed(None)]);
        let (event_tx, _event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let result = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx).await;

        match result {
            Err(StitchError::TaskFailed(msg)) => {
                assert!(!msg.is_empty());
                assert_eq!(msg, GENERIC_FAILURE);
            }
            other => panic!("expected TaskFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn empty_failure_message_is_replaced_too() {
        let api = MockApi::new("j1").with_statuses([ScriptedStatus::failed(Some(""))]);
        let (event_tx, _event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let result = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx).await;
        match result {
            Err(StitchError::TaskFailed(msg)) => assert_eq!(msg, GENERIC_FAILURE),
            other => panic!("expected TaskFailed, got {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn malformed_status_aborts_immediately() {
        let api = MockApi::new("j1").with_statuses([
            ScriptedStatus::status(JobStatus::Running),
            ScriptedStatus::Protocol("status response has no status field".to_string()),
        ]);
        let (event_tx, _event_rx, _shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        let result = poll_job(&api, &mut job, Duration::from_millis(1), 60, &event_tx, &mut shutdown_rx).await;

        assert!(matches!(result, Err(StitchError::Protocol(_))));
        assert_eq!(
            api.status_calls.load(std::sync::atomic::Ordering::Relaxed),
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_signal_cancels_without_error() {
        // A script long enough that the budget would otherwise be exhausted.
        let api = MockApi::new("j1").with_statuses(
            std::iter::repeat_with(|| ScriptedStatus::status(JobStatus::Running)).take(60),
        );
        let (event_tx, _event_rx, shutdown_tx, mut shutdown_rx) = channels();
        let mut job = Job::new("j1".to_string());

        shutdown_tx.send(()).unwrap();
        let outcome = poll_job(&api, &mut job, FAST, 60, &event_tx, &mut shutdown_rx)
            .await
            .unwrap();

        assert_eq!(outcome, PollOutcome::Cancelled);
        // Cancellation pre-empts the budget; no timeout is raised alongside it.
        assert!(api.status_calls.load(std::sync::atomic::Ordering::Relaxed) <= 1);
    }
}
