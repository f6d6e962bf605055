use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Statistics about a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the session was started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio frames forwarded to the service
    pub frames_sent: usize,

    /// Audio frames dropped because the transport was not open
    pub frames_dropped: usize,

    /// Decoded chunks placed on the playback timeline
    pub chunks_scheduled: usize,

    /// Decoded chunks discarded by an interruption
    pub chunks_discarded: usize,

    /// Chunks that failed to decode
    pub decode_failures: usize,

    /// Connect attempts, including the first
    pub connect_attempts: usize,

    /// Reconnects scheduled after errors or unexpected closes
    pub reconnects: usize,

    /// Archived history entries
    pub history_entries: usize,
}

/// Live counters shared between the driver, capture and scheduler tasks
#[derive(Debug, Default)]
pub struct SessionCounters {
    pub frames_sent: AtomicUsize,
    pub frames_dropped: AtomicUsize,
    pub chunks_scheduled: AtomicUsize,
    pub chunks_discarded: AtomicUsize,
    pub decode_failures: AtomicUsize,
    pub connect_attempts: AtomicUsize,
    pub reconnects: AtomicUsize,
}

impl SessionCounters {
    pub fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, started_at: DateTime<Utc>, history_entries: usize) -> SessionStats {
        let duration = Utc::now().signed_duration_since(started_at);

        SessionStats {
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            chunks_discarded: self.chunks_discarded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            connect_attempts: self.connect_attempts.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            history_entries,
        }
    }
}
