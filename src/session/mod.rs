//! Live session management
//!
//! This module provides the `LiveSession` abstraction that manages:
//! - Capture of microphone audio and forwarding to the model service
//! - The connect/open/close/reconnect lifecycle
//! - Classification of inbound events into transcript, citation and mood state
//! - Interruption handling through the epoch counter
//! - Observable signals and session statistics

mod classifier;
mod config;
mod conversation;
mod epoch;
mod grounding;
mod history;
mod lifecycle;
mod session;
mod signals;
mod stats;
mod transport;
mod turn;

pub use classifier::{EventAction, EventClassifier};
pub use config::{document_notification, SessionConfig, UserProfile};
pub use conversation::Conversation;
pub use epoch::{Epoch, InterruptionEpoch};
pub use grounding::{links_from_metadata, GroundingLink, GroundingLinkRing};
pub use history::{ChatEntry, HistoryLog, Role};
pub use lifecycle::LifecycleState;
pub use session::{LiveSession, SessionParts};
pub use signals::{SessionSignals, SignalSender};
pub use stats::{SessionCounters, SessionStats};
pub use transport::{LiveConnector, LiveLink, TransportEvent};
pub use turn::{ArchivedTurn, Mood, MoodMarkers, StrippedText, TurnAccumulator};
