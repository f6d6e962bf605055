use anyhow::{Context, Result};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use crate::config::LiveConfig;
use crate::protocol::{ClientMessage, ServerEvent, SessionSetup};
use crate::session::{LiveConnector, LiveLink, TransportEvent};

const OUTBOUND_CAPACITY: usize = 64;
const INBOUND_CAPACITY: usize = 256;

/// Opens live sessions through a NATS relay
///
/// Each session gets its own connection and session id, so nothing from a
/// discarded session can reach the next one.
pub struct NatsConnector {
    url: String,
    subject_prefix: String,
}

impl NatsConnector {
    pub fn new(url: impl Into<String>, subject_prefix: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            subject_prefix: subject_prefix.into(),
        }
    }
}

impl From<&LiveConfig> for NatsConnector {
    fn from(cfg: &LiveConfig) -> Self {
        Self::new(cfg.nats_url.clone(), cfg.subject_prefix.clone())
    }
}

#[async_trait::async_trait]
impl LiveConnector for NatsConnector {
    async fn connect(&self, setup: SessionSetup) -> Result<LiveLink> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let client = Arc::new(
            NatsClient::connect(&self.url, &self.subject_prefix, session_id.clone())
                .await
                .context("Failed to open live session")?,
        );

        // Subscribe before setup so no early event is missed
        let events = client.subscribe_events().await?;
        client.publish(&ClientMessage::Setup(setup)).await?;
        info!("Live session {} set up", session_id);

        let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CAPACITY);

        tokio::spawn(run_writer(Arc::clone(&client), outbound_rx, inbound_tx.clone()));
        tokio::spawn(run_reader(events, inbound_tx));

        Ok(LiveLink {
            session_id,
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// Publish client messages in order until the session is closed or dropped
async fn run_writer(
    client: Arc<NatsClient>,
    mut outbound: mpsc::Receiver<ClientMessage>,
    inbound: mpsc::Sender<TransportEvent>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = matches!(message, ClientMessage::Close);
        if let Err(e) = client.publish(&message).await {
            let _ = inbound.send(TransportEvent::Error(format!("{:#}", e))).await;
            return;
        }
        if closing {
            break;
        }
    }

    if let Err(e) = client.flush().await {
        debug!("Flush on close failed: {:#}", e);
    }
    debug!("Writer for {} stopped", client.session_id());
}

/// Decode inbound events until the relay stops or the link is dropped
async fn run_reader(mut events: async_nats::Subscriber, inbound: mpsc::Sender<TransportEvent>) {
    loop {
        tokio::select! {
            _ = inbound.closed() => {
                let _ = events.unsubscribe().await;
                return;
            }
            message = events.next() => {
                let Some(message) = message else {
                    break;
                };
                match serde_json::from_slice::<ServerEvent>(&message.payload) {
                    Ok(event) => {
                        if inbound.send(TransportEvent::Message(event)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => warn!("Skipping malformed event on {}: {}", message.subject, e),
                }
            }
        }
    }

    let _ = inbound
        .send(TransportEvent::Closed(Some("event stream ended".to_string())))
        .await;
}
