pub mod poller {
    /// Maximum number of status checks before a job is declared timed out.
    /// Together with the poll interval this bounds one job to five minutes.
    pub const MAX_POLL_ATTEMPTS: u32 = 60;

    /// Delay between consecutive status checks.
    pub const POLL_INTERVAL_MS: u64 = 5000;

    /// Derived progress never exceeds this before a terminal status is
    /// confirmed, so the display cannot claim completion while still polling.
    pub const PROGRESS_CAP: u8 = 95;

    /// Message reported for a failed job when the server omits one.
    pub const GENERIC_FAILURE: &str = "job failed without a reported reason";
}

pub mod runtime {
    // Large enough that a slow consumer never stalls the flow.
    pub const EVENT_QUEUE_SIZE: usize = 100;
}
