pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod nats;
pub mod protocol;
pub mod session;

pub use audio::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioDecoder, AudioFile, AudioFrame,
    AudioSource, ClockedOutput, PayloadDecoder, PlaybackOutput, PlaybackScheduler,
};
pub use config::Config;
pub use error::{DecodeError, LiveError};
pub use http::{create_router, AppState};
pub use nats::{NatsClient, NatsConnector};
pub use protocol::{ClientMessage, ServerEvent, SessionSetup};
pub use session::{
    LifecycleState, LiveConnector, LiveSession, Mood, SessionConfig, SessionParts, SessionSignals,
    SessionStats, UserProfile,
};
