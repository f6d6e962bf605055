//! Error types the session API surfaces to callers.
//!
//! Everything recoverable (transport failures, single bad chunks, malformed
//! events) is absorbed inside the session and turned into state transitions.
//! The variants here are the cases a caller has to act on.

use thiserror::Error;

/// Errors returned by [`crate::LiveSession`] and the audio backends
#[derive(Error, Debug)]
pub enum LiveError {
    /// No capture device could be opened. The session is never started.
    #[error("Microphone unavailable: {0}")]
    MicrophoneUnavailable(String),

    /// Capture source failed to start for another reason
    #[error("Audio capture error: {0}")]
    Capture(String),

    /// A session is already running
    #[error("A live session is already running")]
    AlreadyRunning,

    /// No session is running
    #[error("No live session is running")]
    NotRunning,

    /// The operation needs an open transport
    #[error("Live session is not connected")]
    NotConnected,

    /// The session driver task has exited
    #[error("Live session driver has stopped")]
    DriverStopped,
}

impl LiveError {
    /// Errors that need explicit user action before a retry makes sense
    pub fn requires_user_action(&self) -> bool {
        matches!(self, LiveError::MicrophoneUnavailable(_))
    }
}

/// Failure to decode a single inbound audio payload. Never fatal.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Audio payload is empty")]
    Empty,

    #[error("Invalid base64 audio payload: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("PCM16 payload has odd length ({0} bytes)")]
    OddLength(usize),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Container decode failed: {0}")]
    Container(#[from] symphonia::core::errors::Error),

    #[error("Decode task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_microphone_requires_user_action() {
        assert!(LiveError::MicrophoneUnavailable("none".into()).requires_user_action());
        assert!(!LiveError::NotConnected.requires_user_action());
        assert!(!LiveError::DriverStopped.requires_user_action());
    }
}
