use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;

use super::lifecycle::LifecycleState;
use super::turn::Mood;

/// Derived state exposed to UI and visual collaborators
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSignals {
    pub state: LifecycleState,
    /// A tool call (search) is in progress
    pub searching: bool,
    /// An external document is being summarized
    pub analyzing: bool,
    /// Playback chunks are scheduled
    pub assistant_speaking: bool,
    pub reconnecting: bool,
    pub mood: Mood,
    pub active_document: Option<String>,
}

impl SessionSignals {
    /// Target activity level for the visual layer
    pub fn intensity(&self) -> f32 {
        if self.searching || self.analyzing || self.reconnecting {
            1.0
        } else {
            0.0
        }
    }
}

impl Default for SessionSignals {
    fn default() -> Self {
        Self {
            state: LifecycleState::Disconnected,
            searching: false,
            analyzing: false,
            assistant_speaking: false,
            reconnecting: false,
            mood: Mood::Neutral,
            active_document: None,
        }
    }
}

/// Writer side of the signal channel, shared by the driver and the scheduler
#[derive(Debug, Clone)]
pub struct SignalSender {
    inner: Arc<watch::Sender<SessionSignals>>,
}

impl SignalSender {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionSignals::default());
        Self { inner: Arc::new(tx) }
    }

    /// Apply a change; observers are only woken if something actually changed
    pub fn update(&self, change: impl FnOnce(&mut SessionSignals)) {
        self.inner.send_if_modified(|signals| {
            let before = signals.clone();
            change(signals);
            *signals != before
        });
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSignals> {
        self.inner.subscribe()
    }

    pub fn snapshot(&self) -> SessionSignals {
        self.inner.borrow().clone()
    }
}

impl Default for SignalSender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intensity_follows_activity_flags() {
        let mut signals = SessionSignals::default();
        assert_eq!(signals.intensity(), 0.0);

        signals.searching = true;
        assert_eq!(signals.intensity(), 1.0);

        signals.searching = false;
        signals.reconnecting = true;
        assert_eq!(signals.intensity(), 1.0);

        signals.reconnecting = false;
        signals.assistant_speaking = true;
        assert_eq!(signals.intensity(), 0.0);
    }

    #[tokio::test]
    async fn test_unchanged_update_does_not_wake_observers() {
        let sender = SignalSender::new();
        let mut rx = sender.subscribe();

        sender.update(|s| s.searching = false);
        assert!(!rx.has_changed().unwrap());

        sender.update(|s| s.searching = true);
        assert!(rx.has_changed().unwrap());
        assert!(rx.borrow_and_update().searching);
    }
}
