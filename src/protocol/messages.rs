use serde::{Deserialize, Serialize};

/// Outbound message to the live model service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Opens a session; sent once per transport
    Setup(SessionSetup),
    /// Streaming audio or injected text
    RealtimeInput(RealtimeInput),
    /// The client discarded this session
    Close,
}

/// Session parameters sent on connect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSetup {
    pub model: String,
    pub voice: String,
    pub system_instruction: String,
    /// Always `["AUDIO"]` for this client
    pub response_modalities: Vec<String>,
    pub input_audio_transcription: bool,
    pub output_audio_transcription: bool,
    pub search_tool: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media: Option<Blob>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Base64 audio with mime type, e.g. `audio/pcm;rate=16000`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

impl ClientMessage {
    pub fn audio(blob: Blob) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media: Some(blob),
            text: None,
        })
    }

    pub fn text(text: impl Into<String>) -> Self {
        ClientMessage::RealtimeInput(RealtimeInput {
            media: None,
            text: Some(text.into()),
        })
    }
}
