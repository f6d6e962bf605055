//! Session lifecycle and reconnection
//!
//! A single driver task owns the live transport and every lifecycle
//! transition. Everything else talks to it through [`DriverMsg`]: the public
//! handle, the capture task, the connect task, the inbound pump and the
//! reconnect timer. Messages from the transport are tagged with the connect
//! generation they belong to, so events from a discarded transport are
//! ignored without touching the new one.

use anyhow::Result;
use parking_lot::RwLock;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::classifier::EventClassifier;
use super::config::{document_notification, SessionConfig, UserProfile};
use super::conversation::Conversation;
use super::signals::SignalSender;
use super::stats::SessionCounters;
use super::transport::{LiveConnector, LiveLink, TransportEvent};
use super::turn::Mood;
use crate::audio::PlaybackScheduler;
use crate::error::LiveError;
use crate::protocol::{Blob, ClientMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Erroring,
    Reconnecting,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Disconnected => "disconnected",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Open => "open",
            LifecycleState::Closing => "closing",
            LifecycleState::Erroring => "erroring",
            LifecycleState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

pub(crate) type Reply = oneshot::Sender<Result<(), LiveError>>;

pub(crate) enum DriverMsg {
    Frame(Blob),
    InjectText { text: String, reply: Reply },
    BeginDocument { name: String },
    CompleteDocument { name: String, summary: String, reply: Reply },
    AbandonDocument { name: String, reason: String },
    Reset,
    Shutdown { reply: oneshot::Sender<()> },
    Connected { generation: u64, result: Result<LiveLink> },
    Transport { generation: u64, event: TransportEvent },
    ReconnectDue { timer_id: u64 },
}

struct ActiveLink {
    session_id: String,
    outbound: mpsc::Sender<ClientMessage>,
    pump: JoinHandle<()>,
}

struct ReconnectTimer {
    id: u64,
    task: JoinHandle<()>,
}

pub(crate) struct SessionDriver {
    config: SessionConfig,
    profile: UserProfile,
    connector: Arc<dyn LiveConnector>,
    scheduler: Arc<PlaybackScheduler>,
    classifier: EventClassifier,
    conversation: Arc<RwLock<Conversation>>,
    signals: SignalSender,
    counters: Arc<SessionCounters>,
    control: mpsc::WeakSender<DriverMsg>,

    state: LifecycleState,
    /// Bumped on every connect attempt
    generation: u64,
    connecting: Option<JoinHandle<()>>,
    link: Option<ActiveLink>,
    timer: Option<ReconnectTimer>,
    next_timer_id: u64,
    /// Set from the first failure until the next successful open
    recovering: bool,
}

impl SessionDriver {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        config: SessionConfig,
        profile: UserProfile,
        connector: Arc<dyn LiveConnector>,
        scheduler: Arc<PlaybackScheduler>,
        conversation: Arc<RwLock<Conversation>>,
        signals: SignalSender,
        counters: Arc<SessionCounters>,
        control: mpsc::WeakSender<DriverMsg>,
    ) -> Self {
        let classifier = EventClassifier::new(config.mood_tags.clone());
        Self {
            config,
            profile,
            connector,
            scheduler,
            classifier,
            conversation,
            signals,
            counters,
            control,
            state: LifecycleState::Disconnected,
            generation: 0,
            connecting: None,
            link: None,
            timer: None,
            next_timer_id: 0,
            recovering: false,
        }
    }

    pub(crate) async fn run(mut self, mut inbox: mpsc::Receiver<DriverMsg>) {
        info!("Session driver started (connector: {})", self.connector.name());
        self.begin_connect();

        while let Some(msg) = inbox.recv().await {
            match msg {
                DriverMsg::Frame(blob) => self.forward_frame(blob),

                DriverMsg::InjectText { text, reply } => {
                    let _ = reply.send(self.send_text(text));
                }

                DriverMsg::BeginDocument { name } => self.begin_document(name),

                DriverMsg::CompleteDocument {
                    name,
                    summary,
                    reply,
                } => {
                    let _ = reply.send(self.complete_document(&name, &summary));
                }

                DriverMsg::AbandonDocument { name, reason } => {
                    self.abandon_document(&name, &reason)
                }

                DriverMsg::Reset => self.reset(),

                DriverMsg::Shutdown { reply } => {
                    self.teardown();
                    let _ = reply.send(());
                    return;
                }

                DriverMsg::Connected { generation, result } => {
                    self.on_connected(generation, result)
                }

                DriverMsg::Transport { generation, event } => {
                    self.on_transport(generation, event)
                }

                DriverMsg::ReconnectDue { timer_id } => self.on_reconnect_due(timer_id),
            }
        }

        // Every handle was dropped without an explicit shutdown
        self.teardown();
    }

    fn transition(&mut self, next: LifecycleState) {
        if self.state != next {
            info!("Session {} -> {}", self.state, next);
            self.state = next;
        }

        let recovering = self.recovering;
        self.signals.update(|s| {
            s.state = next;
            s.reconnecting = recovering;
        });
    }

    fn begin_connect(&mut self) {
        self.generation += 1;
        let generation = self.generation;
        SessionCounters::bump(&self.counters.connect_attempts);
        self.transition(LifecycleState::Connecting);

        let connector = Arc::clone(&self.connector);
        let setup = self.config.setup_for(&self.profile);
        let control = self.control.clone();

        if let Some(previous) = self.connecting.take() {
            previous.abort();
        }
        self.connecting = Some(tokio::spawn(async move {
            let result = connector.connect(setup).await;
            if let Some(tx) = control.upgrade() {
                let _ = tx.send(DriverMsg::Connected { generation, result }).await;
            }
        }));
    }

    fn on_connected(&mut self, generation: u64, result: Result<LiveLink>) {
        // A stale result must not touch the attempt that is still in flight
        if generation != self.generation || self.state != LifecycleState::Connecting {
            debug!("Ignoring connect result from generation {}", generation);
            if let Ok(link) = result {
                let _ = link.outbound.try_send(ClientMessage::Close);
            }
            return;
        }
        self.connecting = None;

        match result {
            Ok(link) => {
                let LiveLink {
                    session_id,
                    outbound,
                    inbound,
                } = link;
                info!("Session {} open", session_id);

                let pump = tokio::spawn(pump_inbound(inbound, generation, self.control.clone()));
                self.link = Some(ActiveLink {
                    session_id,
                    outbound,
                    pump,
                });

                self.recovering = false;
                self.transition(LifecycleState::Open);

                let greeting = self.profile.greeting();
                if let Err(e) = self.send_text(greeting) {
                    warn!("Failed to send greeting: {}", e);
                }
            }
            Err(e) => {
                error!("Connect attempt failed: {:#}", e);
                self.recovering = true;
                self.transition(LifecycleState::Erroring);
                self.schedule_reconnect();
            }
        }
    }

    fn on_transport(&mut self, generation: u64, event: TransportEvent) {
        if generation != self.generation {
            debug!("Ignoring event from discarded generation {}", generation);
            return;
        }

        match event {
            TransportEvent::Message(event) => {
                if self.state != LifecycleState::Open {
                    debug!("Ignoring event while {}", self.state);
                    return;
                }
                let mut conversation = self.conversation.write();
                self.classifier
                    .dispatch(&event, &mut conversation, &self.scheduler, &self.signals);
            }

            TransportEvent::Error(reason) => {
                if self.state != LifecycleState::Open {
                    debug!("Ignoring transport error while {}: {}", self.state, reason);
                    return;
                }
                error!("Transport error: {}", reason);
                self.recovering = true;
                self.transition(LifecycleState::Erroring);
                self.discard_link();
                self.schedule_reconnect();
            }

            TransportEvent::Closed(reason) => {
                if self.state != LifecycleState::Open {
                    debug!("Ignoring close while {}", self.state);
                    return;
                }
                warn!(
                    "Session closed unexpectedly: {}",
                    reason.as_deref().unwrap_or("no reason given")
                );
                self.recovering = true;
                self.transition(LifecycleState::Closing);
                self.discard_link();
                self.schedule_reconnect();
            }
        }
    }

    /// Replace any pending reconnect timer with a fresh one
    fn schedule_reconnect(&mut self) {
        self.cancel_timer();

        self.next_timer_id += 1;
        let timer_id = self.next_timer_id;
        let delay = self.config.reconnect_delay;
        let control = self.control.clone();

        SessionCounters::bump(&self.counters.reconnects);
        self.transition(LifecycleState::Reconnecting);
        info!("Reconnecting in {:?}", delay);

        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(tx) = control.upgrade() {
                let _ = tx.send(DriverMsg::ReconnectDue { timer_id }).await;
            }
        });
        self.timer = Some(ReconnectTimer { id: timer_id, task });
    }

    fn on_reconnect_due(&mut self, timer_id: u64) {
        match &self.timer {
            Some(timer) if timer.id == timer_id => {
                self.timer = None;
            }
            _ => {
                debug!("Ignoring superseded reconnect timer {}", timer_id);
                return;
            }
        }

        if self.state == LifecycleState::Reconnecting {
            self.begin_connect();
        }
    }

    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.task.abort();
        }
    }

    /// Fire-and-forget close of the current transport
    fn discard_link(&mut self) {
        if let Some(link) = self.link.take() {
            debug!("Discarding session {}", link.session_id);
            link.pump.abort();
            let _ = link.outbound.try_send(ClientMessage::Close);
        }
    }

    fn forward_frame(&mut self, blob: Blob) {
        let sent = match (&self.link, self.state) {
            (Some(link), LifecycleState::Open) => {
                link.outbound.try_send(ClientMessage::audio(blob)).is_ok()
            }
            _ => false,
        };

        if sent {
            SessionCounters::bump(&self.counters.frames_sent);
        } else {
            SessionCounters::bump(&self.counters.frames_dropped);
        }
    }

    fn send_text(&self, text: String) -> Result<(), LiveError> {
        match (&self.link, self.state) {
            (Some(link), LifecycleState::Open) => link
                .outbound
                .try_send(ClientMessage::text(text))
                .map_err(|_| LiveError::NotConnected),
            _ => Err(LiveError::NotConnected),
        }
    }

    fn begin_document(&mut self, name: String) {
        info!("Analyzing document {}", name);
        {
            let mut conversation = self.conversation.write();
            conversation
                .history
                .archive_system(format!("Ingested {}. Commencing analysis...", name));
            conversation.active_document = Some(name.clone());
        }
        self.signals.update(|s| {
            s.analyzing = true;
            s.active_document = Some(name);
        });
    }

    fn complete_document(&mut self, name: &str, summary: &str) -> Result<(), LiveError> {
        self.signals.update(|s| s.analyzing = false);

        let result = self.send_text(document_notification(name, summary));
        match &result {
            Ok(()) => info!("Injected summary of {}", name),
            Err(e) => warn!("Summary of {} not delivered: {}", name, e),
        }
        result
    }

    fn abandon_document(&mut self, name: &str, reason: &str) {
        warn!("Document {} abandoned: {}", name, reason);
        {
            let mut conversation = self.conversation.write();
            conversation
                .history
                .archive_system(format!("Failed to analyze {}: {}", name, reason));
            if conversation.active_document.as_deref() == Some(name) {
                conversation.active_document = None;
            }
        }
        self.signals.update(|s| {
            s.analyzing = false;
            if s.active_document.as_deref() == Some(name) {
                s.active_document = None;
            }
        });
    }

    /// User-initiated restart: fresh transport, transient state cleared,
    /// history kept
    fn reset(&mut self) {
        info!("Resetting session");
        self.cancel_timer();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        self.discard_link();

        let epoch = self.scheduler.halt();
        debug!("Playback halted at {}", epoch);

        self.conversation.write().reset_transient();
        self.signals.update(|s| {
            s.searching = false;
            s.analyzing = false;
            s.assistant_speaking = false;
            s.mood = Mood::Neutral;
            s.active_document = None;
        });

        self.recovering = true;
        self.begin_connect();
    }

    fn teardown(&mut self) {
        self.cancel_timer();
        if let Some(connecting) = self.connecting.take() {
            connecting.abort();
        }
        self.discard_link();
        self.scheduler.halt();

        self.recovering = false;
        self.transition(LifecycleState::Disconnected);
        self.signals.update(|s| {
            s.searching = false;
            s.analyzing = false;
            s.assistant_speaking = false;
            s.reconnecting = false;
        });
        info!("Session driver stopped");
    }
}

/// Forward inbound transport events to the driver, tagged with `generation`
async fn pump_inbound(
    mut inbound: mpsc::Receiver<TransportEvent>,
    generation: u64,
    control: mpsc::WeakSender<DriverMsg>,
) {
    while let Some(event) = inbound.recv().await {
        let Some(tx) = control.upgrade() else {
            return;
        };
        if tx.send(DriverMsg::Transport { generation, event }).await.is_err() {
            return;
        }
    }

    // The transport went away without saying why
    if let Some(tx) = control.upgrade() {
        let _ = tx
            .send(DriverMsg::Transport {
                generation,
                event: TransportEvent::Closed(None),
            })
            .await;
    }
}
