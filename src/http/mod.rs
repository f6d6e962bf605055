//! HTTP API server for UI collaborators
//!
//! This module provides a REST API for controlling the live session:
//! - POST /session/start - Start a session for a user and subject
//! - POST /session/reset - Discard the transport and reconnect
//! - POST /session/stop - Shut the session down
//! - GET /session/status - Signals, intensity and statistics
//! - GET /session/history - Archived conversation
//! - GET /session/links - Recent citations
//! - POST /session/documents/:name/{begin,summary,abandon} - Document analysis
//! - POST /session/text - Raw text injection
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::{AppState, PartsBuilder};
