//! Message taxonomy exchanged with the live model service
//!
//! Only the parts that drive the session state machine are modelled. Every
//! field is optional on the inbound side: an absent or unknown field simply
//! means "not present".

pub mod events;
pub mod messages;

pub use events::{
    GroundingChunk, GroundingMetadata, InlineData, ModelTurn, Part, ServerContent, ServerEvent,
    TranscriptionFragment, WebSource,
};
pub use messages::{Blob, ClientMessage, RealtimeInput, SessionSetup};
