//! NATS relay transport to the live model service
//!
//! Per session: `{prefix}.{id}.setup` carries the setup message,
//! `{prefix}.{id}.input` carries audio, text and the final close, and
//! `{prefix}.{id}.events` carries JSON server events back.

pub mod client;
pub mod connector;

pub use client::{session_subject, NatsClient};
pub use connector::NatsConnector;
