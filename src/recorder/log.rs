//! Session log feed
//!
//! Bounded, ordered queue of timestamped lines from both dvgrab streams and
//! the supervisor itself. Producers never wait; consumers poll with
//! [`LogFeed::drain`] or park on [`LogFeed::notified`].

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Notify;

/// Lines kept before the oldest are evicted
pub const LOG_LINES_MAX: usize = 5000;

/// Where a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineSource {
    Stdout,
    Stderr,
    Supervisor,
}

/// One line of session output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLine {
    /// Monotonic per feed, starting at 1
    pub seq: u64,
    pub timestamp: DateTime<Local>,
    pub source: LineSource,
    pub text: String,
    pub is_error: bool,
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

#[derive(Debug)]
struct FeedInner {
    lines: VecDeque<LogLine>,
    capacity: usize,
    next_seq: u64,
    evicted: u64,
}

/// Shared handle to a session's log
#[derive(Debug, Clone)]
pub struct LogFeed {
    inner: Arc<Mutex<FeedInner>>,
    notify: Arc<Notify>,
}

impl Default for LogFeed {
    fn default() -> Self {
        Self::with_capacity(LOG_LINES_MAX)
    }
}

impl LogFeed {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Mutex::new(FeedInner {
                lines: VecDeque::with_capacity(capacity.min(1024)),
                capacity,
                next_seq: 1,
                evicted: 0,
            })),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Append a line and return its sequence number
    pub fn push(&self, source: LineSource, text: impl Into<String>, is_error: bool) -> u64 {
        let seq = {
            let mut inner = self.inner.lock();
            let seq = inner.next_seq;
            inner.next_seq += 1;

            if inner.lines.len() >= inner.capacity {
                inner.lines.pop_front();
                inner.evicted += 1;
            }
            inner.lines.push_back(LogLine {
                seq,
                timestamp: Local::now(),
                source,
                text: text.into(),
                is_error,
            });
            seq
        };

        self.notify.notify_one();
        seq
    }

    /// Supervisor message, error-class when `is_error`
    pub fn note(&self, text: impl Into<String>, is_error: bool) -> u64 {
        self.push(LineSource::Supervisor, text, is_error)
    }

    /// Take every queued line without waiting
    pub fn drain(&self) -> Vec<LogLine> {
        self.inner.lock().lines.drain(..).collect()
    }

    /// Copy of the queued lines, leaving them in place
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.inner.lock().lines.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().lines.is_empty()
    }

    /// Lines dropped because nobody drained them in time
    pub fn evicted(&self) -> u64 {
        self.inner.lock().evicted
    }

    /// Resolves after the next push, or immediately if one happened since
    /// the last wait
    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}
