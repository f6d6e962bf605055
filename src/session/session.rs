use super::config::{SessionConfig, UserProfile};
use super::conversation::Conversation;
use super::epoch::InterruptionEpoch;
use super::grounding::GroundingLink;
use super::history::ChatEntry;
use super::lifecycle::{DriverMsg, SessionDriver};
use super::signals::{SessionSignals, SignalSender};
use super::stats::{SessionCounters, SessionStats};
use super::transport::LiveConnector;
use crate::audio::{AudioBackend, AudioDecoder, PcmCapture, PlaybackOutput, PlaybackScheduler};
use crate::error::LiveError;
use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Capacity of the driver's control channel
const CONTROL_CAPACITY: usize = 256;

/// Collaborators a live session is built from
pub struct SessionParts {
    /// Opens transports to the remote model service
    pub connector: Arc<dyn LiveConnector>,

    /// Capture source, acquired before any connect attempt
    pub backend: Box<dyn AudioBackend>,

    /// Decodes inbound audio payloads
    pub decoder: Arc<dyn AudioDecoder>,

    /// Output clock and playback
    pub output: Arc<dyn PlaybackOutput>,
}

/// A running voice session: capture, transport, classification and playback
///
/// The session keeps reconnecting on its own until [`LiveSession::shutdown`]
/// is called.
pub struct LiveSession {
    /// Control channel of the session driver
    control: mpsc::Sender<DriverMsg>,

    /// Observable signals for UI collaborators
    signals: SignalSender,

    /// Transcript, history and citations
    conversation: Arc<RwLock<Conversation>>,

    /// Shared counters
    counters: Arc<SessionCounters>,

    /// When the session started
    started_at: DateTime<Utc>,

    /// Capture source, released on shutdown
    backend: Box<dyn AudioBackend>,

    /// Handle for the capture task
    capture_task: JoinHandle<()>,

    /// Handle for the driver task
    driver_task: JoinHandle<()>,
}

impl LiveSession {
    /// Acquire the capture source, then start connecting
    ///
    /// Capture failure is returned as a [`LiveError`] and nothing is started.
    pub async fn start(config: SessionConfig, profile: UserProfile, parts: SessionParts) -> Result<Self> {
        let SessionParts {
            connector,
            mut backend,
            decoder,
            output,
        } = parts;

        info!(
            "Starting live session for {} ({}) with {} capture",
            profile.user_name,
            profile.subject,
            backend.name()
        );

        let frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start audio capture: {:#}", e);
                if let Err(stop_err) = backend.stop().await {
                    debug!("Capture cleanup failed: {:#}", stop_err);
                }
                return Err(match e.downcast::<LiveError>() {
                    Ok(live) => live.into(),
                    Err(other) => LiveError::Capture(format!("{:#}", other)).into(),
                });
            }
        };

        let signals = SignalSender::new();
        let counters = Arc::new(SessionCounters::default());
        let conversation = Arc::new(RwLock::new(Conversation::new(config.grounding_link_cap)));

        let scheduler = PlaybackScheduler::spawn(
            output,
            decoder,
            Arc::new(InterruptionEpoch::new()),
            signals.clone(),
            Arc::clone(&counters),
            config.max_decodes_in_flight,
        );

        let (control, inbox) = mpsc::channel(CONTROL_CAPACITY);

        let capture = PcmCapture::new(config.input_sample_rate, config.frame_size);
        let capture_task = tokio::spawn(run_capture(
            frames,
            capture,
            signals.subscribe(),
            control.downgrade(),
        ));

        let driver = SessionDriver::new(
            config,
            profile,
            connector,
            scheduler,
            Arc::clone(&conversation),
            signals.clone(),
            Arc::clone(&counters),
            control.downgrade(),
        );
        let driver_task = tokio::spawn(driver.run(inbox));

        Ok(Self {
            control,
            signals,
            conversation,
            counters,
            started_at: Utc::now(),
            backend,
            capture_task,
            driver_task,
        })
    }

    /// Current signal values
    pub fn signals(&self) -> SessionSignals {
        self.signals.snapshot()
    }

    /// Receiver that wakes whenever a signal changes
    pub fn subscribe(&self) -> watch::Receiver<SessionSignals> {
        self.signals.subscribe()
    }

    /// Archived conversation so far
    pub fn history(&self) -> Vec<ChatEntry> {
        self.conversation.read().history.entries().to_vec()
    }

    /// Most recent citations, oldest first
    pub fn grounding_links(&self) -> Vec<GroundingLink> {
        self.conversation.read().links.to_vec()
    }

    /// Send raw text into the open session
    pub async fn inject_text(&self, text: impl Into<String>) -> Result<(), LiveError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverMsg::InjectText {
            text: text.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| LiveError::DriverStopped)?
    }

    /// An external document is being summarized
    pub async fn begin_document(&self, name: impl Into<String>) -> Result<(), LiveError> {
        self.send(DriverMsg::BeginDocument { name: name.into() }).await
    }

    /// Inject a finished document summary as a system notification
    pub async fn complete_document(
        &self,
        name: impl Into<String>,
        summary: impl Into<String>,
    ) -> Result<(), LiveError> {
        let (reply, rx) = oneshot::channel();
        self.send(DriverMsg::CompleteDocument {
            name: name.into(),
            summary: summary.into(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| LiveError::DriverStopped)?
    }

    /// Summarization failed; clear the analyzing state
    pub async fn abandon_document(
        &self,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), LiveError> {
        self.send(DriverMsg::AbandonDocument {
            name: name.into(),
            reason: reason.into(),
        })
        .await
    }

    /// Discard the transport and start over; history is kept
    pub async fn reset(&self) -> Result<(), LiveError> {
        self.send(DriverMsg::Reset).await
    }

    /// Get current session statistics
    pub fn stats(&self) -> SessionStats {
        let history_entries = self.conversation.read().history.len();
        self.counters.snapshot(self.started_at, history_entries)
    }

    /// Tear the session down: close the transport, stop playback, release
    /// the capture source
    pub async fn shutdown(mut self) -> Result<SessionStats> {
        info!("Stopping live session");

        let (reply, rx) = oneshot::channel();
        if self.control.send(DriverMsg::Shutdown { reply }).await.is_ok() {
            let _ = rx.await;
        }
        if let Err(e) = self.driver_task.await {
            error!("Session driver panicked: {}", e);
        }

        // Stop the capture source even if the task already ended
        if let Err(e) = self.backend.stop().await {
            error!("Failed to stop audio backend: {:#}", e);
        }
        self.capture_task.abort();
        let _ = self.capture_task.await;

        let history_entries = self.conversation.read().history.len();
        let stats = self.counters.snapshot(self.started_at, history_entries);
        info!("Live session stopped after {:.1}s", stats.duration_secs);
        Ok(stats)
    }

    async fn send(&self, msg: DriverMsg) -> Result<(), LiveError> {
        self.control
            .send(msg)
            .await
            .map_err(|_| LiveError::DriverStopped)
    }
}

/// Re-frame captured audio and hand wire frames to the driver in capture order
///
/// A partial frame never crosses a lifecycle transition: it is dropped
/// whenever the session state changes.
async fn run_capture(
    mut frames: mpsc::Receiver<crate::audio::AudioFrame>,
    mut capture: PcmCapture,
    mut signals: watch::Receiver<SessionSignals>,
    control: mpsc::WeakSender<DriverMsg>,
) {
    debug!("Capture task started ({})", capture.mime_type());
    let mut state = signals.borrow_and_update().state;

    loop {
        tokio::select! {
            biased;

            changed = signals.changed() => {
                if changed.is_err() {
                    return;
                }
                let next = signals.borrow_and_update().state;
                if next != state {
                    if capture.pending_samples() > 0 {
                        debug!(
                            "Dropping {} samples captured while {}",
                            capture.pending_samples(),
                            state
                        );
                    }
                    capture.clear();
                    state = next;
                }
            }

            frame = frames.recv() => {
                let Some(frame) = frame else {
                    break;
                };
                let blobs = match capture.push(frame) {
                    Ok(blobs) => blobs,
                    Err(e) => {
                        warn!("Dropping captured frame: {:#}", e);
                        continue;
                    }
                };
                for blob in blobs {
                    let Some(tx) = control.upgrade() else {
                        return;
                    };
                    if tx.send(DriverMsg::Frame(blob)).await.is_err() {
                        return;
                    }
                }
            }
        }
    }

    debug!("Capture source ended ({} samples unsent)", capture.pending_samples());
}
