// Integration tests for the live session lifecycle
//
// A scripted connector hands out in-memory links so each test can play the
// remote service: push events, close or fail the transport, and inspect what
// the client sent. Time is paused, so the reconnect delay is exact.

use anyhow::{bail, Result};
use base64::Engine;
use loqa_live::audio::{AudioBackend, AudioFrame, ChannelBackend, ClockedOutput, PayloadDecoder};
use loqa_live::error::LiveError;
use loqa_live::protocol::{ClientMessage, RealtimeInput, ServerEvent, SessionSetup};
use loqa_live::session::{
    LifecycleState, LiveConnector, LiveLink, LiveSession, Mood, Role, SessionConfig, SessionParts,
    TransportEvent, UserProfile,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

// ============================================================================
// Test doubles
// ============================================================================

/// The service side of one link
struct RemoteEnd {
    setup: SessionSetup,
    from_client: mpsc::Receiver<ClientMessage>,
    to_client: mpsc::Sender<TransportEvent>,
}

impl RemoteEnd {
    fn drain(&mut self) -> Vec<ClientMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.from_client.try_recv() {
            messages.push(message);
        }
        messages
    }

    async fn event(&self, json: &str) {
        let event: ServerEvent = serde_json::from_str(json).unwrap();
        let _ = self.to_client.send(TransportEvent::Message(event)).await;
    }
}

#[derive(Default)]
struct ScriptedConnector {
    attempts: AtomicUsize,
    failures_left: AtomicUsize,
    remotes: Mutex<Vec<RemoteEnd>>,
}

impl ScriptedConnector {
    fn failing_first(failures: usize) -> Self {
        let connector = Self::default();
        connector.failures_left.store(failures, Ordering::SeqCst);
        connector
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn links(&self) -> usize {
        self.remotes.lock().len()
    }

    fn with_remote<T>(&self, index: usize, f: impl FnOnce(&mut RemoteEnd) -> T) -> T {
        f(&mut self.remotes.lock()[index])
    }

    fn sender(&self, index: usize) -> mpsc::Sender<TransportEvent> {
        self.remotes.lock()[index].to_client.clone()
    }
}

#[async_trait::async_trait]
impl LiveConnector for ScriptedConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveLink> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            bail!("relay unreachable (attempt {})", attempt);
        }

        let (outbound, from_client) = mpsc::channel(64);
        let (to_client, inbound) = mpsc::channel(64);
        self.remotes.lock().push(RemoteEnd {
            setup,
            from_client,
            to_client,
        });

        Ok(LiveLink {
            session_id: format!("scripted-{}", attempt),
            outbound,
            inbound,
        })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Capture source whose device is missing
struct MissingMicrophone {
    stopped: Arc<AtomicBool>,
}

#[async_trait::async_trait]
impl AudioBackend for MissingMicrophone {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        Err(LiveError::MicrophoneUnavailable("permission denied".into()).into())
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        false
    }

    fn name(&self) -> &str {
        "missing"
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn profile() -> UserProfile {
    UserProfile {
        user_name: "Ada".to_string(),
        subject: "orbital mechanics".to_string(),
    }
}

struct Running {
    session: LiveSession,
    connector: Arc<ScriptedConnector>,
    mic: mpsc::Sender<AudioFrame>,
    mic_stopped: Arc<AtomicBool>,
}

async fn start_with(connector: ScriptedConnector) -> Result<Running> {
    let connector = Arc::new(connector);
    let (backend, mic) = ChannelBackend::new(16);
    let mic_stopped = backend.stopped_flag();

    let parts = SessionParts {
        connector: connector.clone(),
        backend: Box::new(backend),
        decoder: Arc::new(PayloadDecoder::new(24000)),
        output: Arc::new(ClockedOutput::new()),
    };

    let session = LiveSession::start(SessionConfig::default(), profile(), parts).await?;
    settle().await;

    Ok(Running {
        session,
        connector,
        mic,
        mic_stopped,
    })
}

async fn start() -> Result<Running> {
    start_with(ScriptedConnector::default()).await
}

/// Let every session task run until it blocks
async fn settle() {
    for _ in 0..100 {
        tokio::task::yield_now().await;
    }
}

fn texts(messages: &[ClientMessage]) -> Vec<String> {
    messages
        .iter()
        .filter_map(|m| match m {
            ClientMessage::RealtimeInput(RealtimeInput { text: Some(text), .. }) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

fn audio_count(messages: &[ClientMessage]) -> usize {
    messages
        .iter()
        .filter(|m| matches!(m, ClientMessage::RealtimeInput(RealtimeInput { media: Some(_), .. })))
        .count()
}

fn mic_samples(value: i16, len: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![value; len],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}

fn audio_samples(messages: &[ClientMessage]) -> Vec<Vec<i16>> {
    messages
        .iter()
        .filter_map(|m| match m {
            ClientMessage::RealtimeInput(RealtimeInput { media: Some(blob), .. }) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(&blob.data)
                    .unwrap();
                Some(
                    bytes
                        .chunks_exact(2)
                        .map(|b| i16::from_le_bytes([b[0], b[1]]))
                        .collect(),
                )
            }
            _ => None,
        })
        .collect()
}

/// One full wire frame (2048 samples at 16kHz mono)
fn mic_frame() -> AudioFrame {
    AudioFrame {
        samples: vec![100; 2048],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: 0,
    }
}

// ============================================================================
// Connect and open
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_greeting_sent_on_open() -> Result<()> {
    let run = start().await?;

    assert_eq!(run.session.signals().state, LifecycleState::Open);
    assert_eq!(run.connector.attempts(), 1);

    let (setup, sent) = run.connector.with_remote(0, |r| (r.setup.clone(), r.drain()));
    assert!(setup.system_instruction.contains("User name: Ada"));
    assert_eq!(
        texts(&sent),
        vec!["Say exactly: \"Hi Ada, how can I help you with orbital mechanics?\"".to_string()]
    );

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_missing_microphone_fails_before_connecting() -> Result<()> {
    let connector = Arc::new(ScriptedConnector::default());
    let stopped = Arc::new(AtomicBool::new(false));

    let parts = SessionParts {
        connector: connector.clone(),
        backend: Box::new(MissingMicrophone {
            stopped: Arc::clone(&stopped),
        }),
        decoder: Arc::new(PayloadDecoder::new(24000)),
        output: Arc::new(ClockedOutput::new()),
    };

    let err = match LiveSession::start(SessionConfig::default(), profile(), parts).await {
        Ok(_) => panic!("session should not start without a microphone"),
        Err(e) => e,
    };
    settle().await;

    let live = err.downcast_ref::<LiveError>();
    assert!(matches!(live, Some(LiveError::MicrophoneUnavailable(_))));
    assert!(live.is_some_and(|e| e.requires_user_action()));
    assert_eq!(connector.attempts(), 0);
    assert!(stopped.load(Ordering::SeqCst), "capture source must be released");

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_frames_forwarded_only_while_open() -> Result<()> {
    let run = start().await?;
    run.connector.with_remote(0, |r| r.drain());

    run.mic.send(mic_frame()).await?;
    run.mic.send(mic_frame()).await?;
    settle().await;

    let sent = run.connector.with_remote(0, |r| r.drain());
    assert_eq!(audio_count(&sent), 2);

    // Transport goes away; frames captured during the gap are dropped
    let _ = run.connector.sender(0).send(TransportEvent::Closed(None)).await;
    settle().await;
    run.mic.send(mic_frame()).await?;
    settle().await;

    let stats = run.session.stats();
    assert_eq!(stats.frames_sent, 2);
    assert_eq!(stats.frames_dropped, 1);

    run.session.shutdown().await?;
    Ok(())
}

// ============================================================================
// Reconnection
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_double_close_reconnects_exactly_once() -> Result<()> {
    let run = start().await?;
    let events = run.connector.sender(0);

    let _ = events.send(TransportEvent::Closed(Some("going away".into()))).await;
    let _ = events.send(TransportEvent::Closed(None)).await;
    settle().await;

    let signals = run.session.signals();
    assert_eq!(signals.state, LifecycleState::Reconnecting);
    assert!(signals.reconnecting);
    assert_eq!(signals.intensity(), 1.0);

    tokio::time::sleep(Duration::from_millis(1900)).await;
    settle().await;
    assert_eq!(run.connector.attempts(), 1, "no attempt before the delay");

    tokio::time::sleep(Duration::from_millis(200)).await;
    settle().await;
    assert_eq!(run.connector.attempts(), 2);

    tokio::time::sleep(Duration::from_secs(10)).await;
    settle().await;
    assert_eq!(run.connector.attempts(), 2, "exactly one reconnect");

    let signals = run.session.signals();
    assert_eq!(signals.state, LifecycleState::Open);
    assert!(!signals.reconnecting);

    // The new session is greeted again
    let sent = run.connector.with_remote(1, |r| r.drain());
    assert_eq!(texts(&sent).len(), 1);

    let stats = run.session.stats();
    assert_eq!(stats.connect_attempts, 2);
    assert_eq!(stats.reconnects, 1);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_error_then_close_is_a_single_reconnect() -> Result<()> {
    let run = start().await?;
    let events = run.connector.sender(0);

    let _ = events.send(TransportEvent::Error("socket reset".into())).await;
    let _ = events.send(TransportEvent::Closed(None)).await;
    settle().await;

    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;

    assert_eq!(run.connector.attempts(), 2);
    assert_eq!(run.session.stats().reconnects, 1);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_partial_frame_does_not_survive_a_reconnect() -> Result<()> {
    let run = start().await?;

    // Half a wire frame captured on the first link
    run.mic.send(mic_samples(1, 1024)).await?;
    settle().await;

    let _ = run.connector.sender(0).send(TransportEvent::Closed(None)).await;
    settle().await;
    tokio::time::sleep(Duration::from_millis(2100)).await;
    settle().await;
    assert_eq!(run.session.signals().state, LifecycleState::Open);
    run.connector.with_remote(1, |r| r.drain());

    run.mic.send(mic_samples(2, 1024)).await?;
    settle().await;
    assert_eq!(audio_count(&run.connector.with_remote(1, |r| r.drain())), 0);

    run.mic.send(mic_samples(2, 1024)).await?;
    settle().await;

    let sent = run.connector.with_remote(1, |r| r.drain());
    let frames = audio_samples(&sent);
    assert_eq!(frames.len(), 1);
    assert!(frames[0].iter().all(|&s| s == 2), "stale samples leaked into the new link");

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_failed_connects_retry_indefinitely() -> Result<()> {
    let run = start_with(ScriptedConnector::failing_first(3)).await?;
    assert_eq!(run.session.signals().state, LifecycleState::Reconnecting);

    for expected in 2..=4 {
        tokio::time::sleep(Duration::from_millis(2001)).await;
        settle().await;
        assert_eq!(run.connector.attempts(), expected);
    }

    assert_eq!(run.session.signals().state, LifecycleState::Open);
    assert_eq!(run.connector.links(), 1);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_events_from_discarded_link_are_ignored() -> Result<()> {
    let run = start().await?;
    let old = run.connector.sender(0);

    run.session.reset().await?;
    settle().await;
    assert_eq!(run.connector.links(), 2);

    let event: ServerEvent =
        serde_json::from_str(r#"{"serverContent": {"inputTranscription": {"text": "stale"}, "turnComplete": true}}"#)?;
    let _ = old.send(TransportEvent::Message(event)).await;
    let _ = old.send(TransportEvent::Closed(None)).await;
    settle().await;

    assert!(run.session.history().is_empty());
    assert_eq!(run.session.signals().state, LifecycleState::Open);

    run.session.shutdown().await?;
    Ok(())
}

// ============================================================================
// Event classification through the session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_user_only_turn_archives_one_entry() -> Result<()> {
    let run = start().await?;

    run.connector
        .with_remote(0, |r| r.to_client.clone())
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"inputTranscription": {"text": "Hello"}}}"#,
        )?))
        .await?;
    run.connector
        .with_remote(0, |r| r.to_client.clone())
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"turnComplete": true}}"#,
        )?))
        .await?;
    settle().await;

    let history = run.session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::User);
    assert_eq!(history[0].text, "Hello");

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_mood_marker_sets_mood_and_is_stripped() -> Result<()> {
    let run = start().await?;
    let remote = run.connector.sender(0);

    remote
        .send(TransportEvent::Message(serde_json::from_str(r#"{"toolCall": {}}"#)?))
        .await?;
    settle().await;
    assert!(run.session.signals().searching);

    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"outputTranscription": {"text": "A [MOOD:SAD] B"}}}"#,
        )?))
        .await?;
    settle().await;

    let signals = run.session.signals();
    assert_eq!(signals.mood, Mood::Sad);
    assert!(!signals.searching);

    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"turnComplete": true}}"#,
        )?))
        .await?;
    settle().await;

    let history = run.session.history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].role, Role::Assistant);
    assert_eq!(history[0].text, "A B");
    assert_eq!(run.session.signals().mood, Mood::Neutral);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_interruption_archives_partial_turn() -> Result<()> {
    let run = start().await?;
    let remote = run.connector.sender(0);

    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"inputTranscription": {"text": "stop"}, "outputTranscription": {"text": "Once upon a [MOOD:MYSTICAL] time"}}}"#,
        )?))
        .await?;
    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"interrupted": true}}"#,
        )?))
        .await?;
    settle().await;

    let history = run.session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].text, "stop");
    assert_eq!(history[1].text, "Once upon a time");

    let signals = run.session.signals();
    assert_eq!(signals.mood, Mood::Neutral);
    assert!(!signals.assistant_speaking);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_grounding_links_are_capped() -> Result<()> {
    let run = start().await?;
    let remote = run.connector.sender(0);

    for i in 0..7 {
        let json = format!(
            r#"{{"serverContent": {{"groundingMetadata": {{"groundingChunks": [{{"web": {{"uri": "https://example.com/{i}", "title": "Result {i}"}}}}]}}}}}}"#
        );
        remote
            .send(TransportEvent::Message(serde_json::from_str(&json)?))
            .await?;
    }
    settle().await;

    let links = run.session.grounding_links();
    assert_eq!(links.len(), 5);
    assert_eq!(links[0].uri, "https://example.com/2");
    assert_eq!(links[4].uri, "https://example.com/6");

    run.session.shutdown().await?;
    Ok(())
}

// ============================================================================
// Reset, documents, shutdown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_reset_keeps_history_and_clears_the_rest() -> Result<()> {
    let run = start().await?;
    let remote = run.connector.sender(0);

    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"inputTranscription": {"text": "Hello"}, "turnComplete": true}}"#,
        )?))
        .await?;
    remote
        .send(TransportEvent::Message(serde_json::from_str(
            r#"{"serverContent": {"groundingMetadata": {"groundingChunks": [{"web": {"uri": "https://a", "title": "A"}}]}, "outputTranscription": {"text": "[MOOD:ANGRY] grr"}}}"#,
        )?))
        .await?;
    settle().await;
    assert_eq!(run.session.grounding_links().len(), 1);

    run.session.reset().await?;
    settle().await;

    // Old transport was told to close, a new one opened and greeted
    let old = run.connector.with_remote(0, |r| r.drain());
    assert_eq!(old.last(), Some(&ClientMessage::Close));
    assert_eq!(run.connector.links(), 2);
    assert_eq!(texts(&run.connector.with_remote(1, |r| r.drain())).len(), 1);

    assert_eq!(run.session.history().len(), 1);
    assert!(run.session.grounding_links().is_empty());

    let signals = run.session.signals();
    assert_eq!(signals.state, LifecycleState::Open);
    assert_eq!(signals.mood, Mood::Neutral);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_document_summary_is_injected() -> Result<()> {
    let run = start().await?;
    run.connector.with_remote(0, |r| r.drain());

    run.session.begin_document("notes.pdf").await?;
    settle().await;

    let signals = run.session.signals();
    assert!(signals.analyzing);
    assert_eq!(signals.active_document.as_deref(), Some("notes.pdf"));
    assert_eq!(signals.intensity(), 1.0);

    let history = run.session.history();
    assert_eq!(history[0].role, Role::System);
    assert_eq!(history[0].text, "Ingested notes.pdf. Commencing analysis...");

    run.session
        .complete_document("notes.pdf", "Kepler's laws, worked examples")
        .await?;

    let sent = run.connector.with_remote(0, |r| r.drain());
    assert_eq!(
        texts(&sent),
        vec!["SYSTEM NOTIFICATION: Document \"notes.pdf\" uploaded. Summary: Kepler's laws, worked examples".to_string()]
    );
    assert!(!run.session.signals().analyzing);

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_text_needs_an_open_transport() -> Result<()> {
    let run = start().await?;

    let _ = run.connector.sender(0).send(TransportEvent::Closed(None)).await;
    settle().await;

    let result = run.session.inject_text("anyone there?").await;
    assert!(matches!(result, Err(LiveError::NotConnected)));

    run.session.shutdown().await?;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_releases_capture_and_stops_reconnecting() -> Result<()> {
    let run = start().await?;
    let mic_stopped = Arc::clone(&run.mic_stopped);
    let connector = Arc::clone(&run.connector);

    let _ = connector.sender(0).send(TransportEvent::Closed(None)).await;
    settle().await;

    let mut signals = run.session.subscribe();
    let stats = run.session.shutdown().await?;
    assert_eq!(stats.connect_attempts, 1);
    assert!(mic_stopped.load(Ordering::SeqCst));
    assert_eq!(signals.borrow_and_update().state, LifecycleState::Disconnected);

    tokio::time::sleep(Duration::from_secs(5)).await;
    settle().await;
    assert_eq!(connector.attempts(), 1, "no reconnect after shutdown");

    Ok(())
}
