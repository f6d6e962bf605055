//! Decode/playback scheduler
//!
//! Inbound audio payloads are decoded concurrently (up to a bound) but
//! applied strictly in arrival order. Each decode carries the epoch captured
//! when its payload arrived; a result whose epoch is no longer current is
//! discarded. Surviving chunks are chained on the output timeline through a
//! single cursor so that each one starts exactly where the previous ended.
//!
//! All playback state (cursor, pending set, epoch advances) is mutated under
//! one lock, which is the only ordering point between decode completions,
//! playback completions and interruptions.

use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::decode::{AudioDecoder, DecodedChunk};
use super::output::{PlaybackHandle, PlaybackId, PlaybackOutput};
use crate::error::DecodeError;
use crate::protocol::InlineData;
use crate::session::{Epoch, InterruptionEpoch, SessionCounters, SignalSender};

/// Where a chunk landed on the output timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: PlaybackId,
    pub start: f64,
    pub end: f64,
}

struct PlaybackState {
    /// Output time at which the next chunk must begin
    next_start_time: f64,
    pending: HashMap<PlaybackId, Box<dyn PlaybackHandle>>,
    next_id: PlaybackId,
}

struct DecodeJob {
    epoch: Epoch,
    payload: InlineData,
}

pub struct PlaybackScheduler {
    state: Mutex<PlaybackState>,
    epoch: Arc<InterruptionEpoch>,
    output: Arc<dyn PlaybackOutput>,
    signals: SignalSender,
    counters: Arc<SessionCounters>,
    jobs: mpsc::UnboundedSender<DecodeJob>,
    finished: mpsc::UnboundedSender<PlaybackId>,
}

impl PlaybackScheduler {
    /// Create the scheduler and spawn its decode and completion tasks
    pub fn spawn(
        output: Arc<dyn PlaybackOutput>,
        decoder: Arc<dyn AudioDecoder>,
        epoch: Arc<InterruptionEpoch>,
        signals: SignalSender,
        counters: Arc<SessionCounters>,
        max_decodes_in_flight: usize,
    ) -> Arc<Self> {
        let (jobs_tx, jobs_rx) = mpsc::unbounded_channel();
        let (finished_tx, finished_rx) = mpsc::unbounded_channel();

        let scheduler = Arc::new(Self {
            state: Mutex::new(PlaybackState {
                next_start_time: output.now(),
                pending: HashMap::new(),
                next_id: 0,
            }),
            epoch,
            output,
            signals,
            counters,
            jobs: jobs_tx,
            finished: finished_tx,
        });

        tokio::spawn(run_decode_pipeline(
            Arc::downgrade(&scheduler),
            decoder,
            jobs_rx,
            max_decodes_in_flight.max(1),
        ));
        tokio::spawn(run_completions(Arc::downgrade(&scheduler), finished_rx));

        scheduler
    }

    /// Queue an encoded payload for decode under the current epoch
    pub fn submit(&self, payload: InlineData) -> Epoch {
        let epoch = self.epoch.current();

        if payload.data.is_empty() {
            warn!("Dropping empty audio payload");
            SessionCounters::bump(&self.counters.decode_failures);
            return epoch;
        }

        if self.jobs.send(DecodeJob { epoch, payload }).is_err() {
            warn!("Decode pipeline has stopped, dropping audio payload");
        }
        epoch
    }

    /// Place a decoded chunk on the timeline if `captured` is still current
    pub fn schedule(&self, captured: Epoch, chunk: DecodedChunk) -> Option<ScheduledChunk> {
        let mut state = self.state.lock();

        if !self.epoch.is_current(captured) {
            debug!(
                "Discarding chunk decoded under {} (now {})",
                captured,
                self.epoch.current()
            );
            SessionCounters::bump(&self.counters.chunks_discarded);
            return None;
        }

        let start = state.next_start_time.max(self.output.now());
        let end = start + chunk.duration_secs();
        let id = state.next_id;
        state.next_id += 1;

        let handle = self.output.start(id, chunk, start, self.finished.clone());
        state.pending.insert(id, handle);
        state.next_start_time = end;

        SessionCounters::bump(&self.counters.chunks_scheduled);
        self.signals.update(|s| {
            s.assistant_speaking = true;
            s.searching = false;
        });

        Some(ScheduledChunk { id, start, end })
    }

    /// Server-signalled interruption
    ///
    /// In one critical section: advance the epoch, run `archive`, stop and
    /// forget every pending chunk, reset the cursor to now. Any decode that
    /// completes concurrently sees the new epoch and is rejected.
    pub fn interrupt<F: FnOnce()>(&self, archive: F) -> Epoch {
        let mut state = self.state.lock();
        let epoch = self.epoch.advance();

        archive();

        let stopped = state.pending.len();
        for (_, handle) in state.pending.drain() {
            handle.stop();
        }
        state.next_start_time = self.output.now();

        self.signals.update(|s| s.assistant_speaking = false);
        info!("Playback interrupted ({} chunks stopped, now {})", stopped, epoch);
        epoch
    }

    /// Drop all playback and invalidate in-flight decodes (session reset)
    pub fn halt(&self) -> Epoch {
        self.interrupt(|| ())
    }

    fn finish(&self, id: PlaybackId) {
        let mut state = self.state.lock();
        if state.pending.remove(&id).is_some() && state.pending.is_empty() {
            self.signals.update(|s| s.assistant_speaking = false);
        }
    }

    fn decode_failed(&self, captured: Epoch, error: DecodeError) {
        if self.epoch.is_current(captured) {
            warn!("Dropping audio chunk: {}", error);
        } else {
            debug!("Stale chunk failed to decode: {}", error);
        }
        SessionCounters::bump(&self.counters.decode_failures);
    }

    pub fn current_epoch(&self) -> Epoch {
        self.epoch.current()
    }

    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn next_start_time(&self) -> f64 {
        self.state.lock().next_start_time
    }
}

impl Drop for PlaybackScheduler {
    fn drop(&mut self) {
        for (_, handle) in self.state.get_mut().pending.drain() {
            handle.stop();
        }
    }
}

/// Decode up to `max_in_flight` payloads at once, apply results in order
async fn run_decode_pipeline(
    scheduler: Weak<PlaybackScheduler>,
    decoder: Arc<dyn AudioDecoder>,
    mut jobs: mpsc::UnboundedReceiver<DecodeJob>,
    max_in_flight: usize,
) {
    let decoded = stream::poll_fn(move |cx| jobs.poll_recv(cx))
        .map(move |job| {
            let decoder = Arc::clone(&decoder);
            async move { (job.epoch, decoder.decode(job.payload).await) }
        })
        .buffered(max_in_flight);
    futures::pin_mut!(decoded);

    while let Some((epoch, result)) = decoded.next().await {
        let Some(scheduler) = scheduler.upgrade() else {
            break;
        };
        match result {
            Ok(chunk) => {
                scheduler.schedule(epoch, chunk);
            }
            Err(e) => scheduler.decode_failed(epoch, e),
        }
    }
    debug!("Decode pipeline stopped");
}

async fn run_completions(
    scheduler: Weak<PlaybackScheduler>,
    mut finished: mpsc::UnboundedReceiver<PlaybackId>,
) {
    while let Some(id) = finished.recv().await {
        let Some(scheduler) = scheduler.upgrade() else {
            break;
        };
        scheduler.finish(id);
    }
}
