//! Playback output and its clock
//!
//! The scheduler places chunks on the output clock's timeline; the output is
//! responsible for actually starting each chunk at its start time, reporting
//! when it has finished, and stopping it early on request.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::debug;

use super::decode::DecodedChunk;

/// Identifier of a scheduled chunk, unique per scheduler
pub type PlaybackId = u64;

/// A scheduled chunk that can be stopped before it finishes
pub trait PlaybackHandle: Send + Sync {
    fn stop(&self);
}

/// Audio output with its own clock
pub trait PlaybackOutput: Send + Sync {
    /// Current output-clock time in seconds
    fn now(&self) -> f64;

    /// Start `chunk` at output time `at`; send `id` on `finished` once it has
    /// played to the end. A stopped chunk never reports.
    fn start(
        &self,
        id: PlaybackId,
        chunk: DecodedChunk,
        at: f64,
        finished: mpsc::UnboundedSender<PlaybackId>,
    ) -> Box<dyn PlaybackHandle>;
}

/// Output driven by the tokio clock
///
/// Each chunk is a timer task: at its start time the chunk is handed to the
/// renderer (if any), and after its duration the chunk reports finished.
pub struct ClockedOutput {
    epoch: Instant,
    renderer: Option<mpsc::UnboundedSender<DecodedChunk>>,
}

impl ClockedOutput {
    /// Output that only keeps time (headless)
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            renderer: None,
        }
    }

    /// Output that forwards each chunk, with its rate and layout, to a
    /// renderer when due
    pub fn with_renderer(renderer: mpsc::UnboundedSender<DecodedChunk>) -> Self {
        Self {
            epoch: Instant::now(),
            renderer: Some(renderer),
        }
    }

    fn instant_at(&self, at: f64) -> Instant {
        self.epoch + Duration::from_secs_f64(at.max(0.0))
    }
}

impl Default for ClockedOutput {
    fn default() -> Self {
        Self::new()
    }
}

struct TimerHandle {
    task: JoinHandle<()>,
}

impl PlaybackHandle for TimerHandle {
    fn stop(&self) {
        self.task.abort();
    }
}

impl PlaybackOutput for ClockedOutput {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn start(
        &self,
        id: PlaybackId,
        chunk: DecodedChunk,
        at: f64,
        finished: mpsc::UnboundedSender<PlaybackId>,
    ) -> Box<dyn PlaybackHandle> {
        let start = self.instant_at(at);
        let end = start + chunk.duration();
        let renderer = self.renderer.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(start).await;
            if let Some(renderer) = renderer {
                if renderer.send(chunk).is_err() {
                    debug!("Renderer gone, chunk {} plays silently", id);
                }
            }
            tokio::time::sleep_until(end).await;
            let _ = finished.send(id);
        });

        Box::new(TimerHandle { task })
    }
}
