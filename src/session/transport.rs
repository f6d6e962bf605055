use anyhow::Result;
use tokio::sync::mpsc;

use crate::protocol::{ClientMessage, ServerEvent, SessionSetup};

/// What the transport reports about an open session
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A decoded inbound event
    Message(ServerEvent),
    /// The transport failed; the session is unusable
    Error(String),
    /// The remote end closed the session
    Closed(Option<String>),
}

/// An open session with the remote model service
///
/// Dropping the outbound sender closes the session from the client side.
pub struct LiveLink {
    pub session_id: String,
    pub outbound: mpsc::Sender<ClientMessage>,
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Opens sessions with the remote model service
///
/// Each call yields a brand-new transport; nothing is shared with links
/// returned earlier.
#[async_trait::async_trait]
pub trait LiveConnector: Send + Sync {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveLink>;

    fn name(&self) -> &str;
}
