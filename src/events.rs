//! Flow events.
//!
//! The stitch flow reports what it is doing as plain data over a channel;
//! whatever front-end consumes the channel decides how to render it.

use std::fmt::Display;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventType {
    Status,
    Progress,
    Success,
    Warning,
    Error,
    Shutdown,
}

/// Stage of the flow an event originates from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Submitter,
    Poller,
    Downloader,
    Listings,
}

impl Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::Submitter => write!(f, "submitter"),
            Source::Poller => write!(f, "poller"),
            Source::Downloader => write!(f, "downloader"),
            Source::Listings => write!(f, "listings"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Event {
    pub source: Source,
    pub msg: String,
    pub event_type: EventType,
    /// Derived completion percentage, present on progress events only.
    pub progress: Option<u8>,
    pub timestamp: String,
}

impl Event {
    fn new(source: Source, msg: String, event_type: EventType, progress: Option<u8>) -> Self {
        Self {
            source,
            msg,
            event_type,
            progress,
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
        }
    }

    pub fn submitter(msg: String, event_type: EventType) -> Self {
        Self::new(Source::Submitter, msg, event_type, None)
    }

    pub fn poller(msg: String, event_type: EventType) -> Self {
        Self::new(Source::Poller, msg, event_type, None)
    }

    /// A non-terminal poll observation with its derived progress estimate.
    pub fn poller_progress(msg: String, progress: u8) -> Self {
        Self::new(Source::Poller, msg, EventType::Progress, Some(progress))
    }

    pub fn downloader(msg: String, event_type: EventType) -> Self {
        Self::new(Source::Downloader, msg, event_type, None)
    }

    pub fn listings(msg: String, event_type: EventType) -> Self {
        Self::new(Source::Listings, msg, event_type, None)
    }
}

impl Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.timestamp, self.source, self.msg)
    }
}
