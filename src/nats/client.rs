use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use crate::protocol::ClientMessage;

/// Subject for one leaf of a live session: `{prefix}.{session_id}.{leaf}`
pub fn session_subject(prefix: &str, session_id: &str, leaf: &str) -> String {
    format!("{}.{}.{}", prefix, session_id, leaf)
}

/// Subject a client message is published on
pub fn subject_leaf(message: &ClientMessage) -> &'static str {
    match message {
        ClientMessage::Setup(_) => "setup",
        ClientMessage::RealtimeInput(_) | ClientMessage::Close => "input",
    }
}

pub struct NatsClient {
    client: Client,
    subject_prefix: String,
    session_id: String,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: &str, session_id: String) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject_prefix: subject_prefix.to_string(),
            session_id,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn subject(&self, leaf: &str) -> String {
        session_subject(&self.subject_prefix, &self.session_id, leaf)
    }

    /// Publish a client message on the session's setup or input subject
    pub async fn publish(&self, message: &ClientMessage) -> Result<()> {
        let subject = self.subject(subject_leaf(message));
        let payload = serde_json::to_vec(message)?;
        let bytes = payload.len();

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        debug!("Published {} bytes to {}", bytes, subject);
        Ok(())
    }

    /// Subscribe to the session's inbound event stream
    pub async fn subscribe_events(&self) -> Result<async_nats::Subscriber> {
        let subject = self.subject("events");

        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .context("Failed to subscribe to session events")?;

        info!("Subscribed to {}", subject);

        Ok(subscriber)
    }

    pub async fn flush(&self) -> Result<()> {
        self.client.flush().await.context("Failed to flush NATS connection")?;
        Ok(())
    }
}
