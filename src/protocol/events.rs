use serde::{Deserialize, Serialize};

/// One inbound event from the live model service
///
/// A single event may carry several concerns at once (a transcript fragment
/// and an audio part, a turn-complete flag and grounding metadata, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerEvent {
    /// Present when the model invoked a tool (e.g. web search)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call: Option<serde_json::Value>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_content: Option<ServerContent>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub setup_complete: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_turn: Option<ModelTurn>,

    /// Speech-to-text of the user's microphone audio
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_transcription: Option<TranscriptionFragment>,

    /// Text of what the assistant is saying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_transcription: Option<TranscriptionFragment>,

    pub turn_complete: bool,

    pub interrupted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

/// Base64 payload with its mime type (e.g. `audio/pcm;rate=24000`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionFragment {
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingMetadata {
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroundingChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web: Option<WebSource>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebSource {
    pub uri: String,
    pub title: String,
}

impl InlineData {
    pub fn is_audio(&self) -> bool {
        self.mime_type.is_empty() || self.mime_type.starts_with("audio/")
    }
}

impl ServerEvent {
    /// Audio payloads carried by the model turn, in part order
    pub fn audio_parts(&self) -> impl Iterator<Item = &InlineData> {
        self.server_content
            .iter()
            .filter_map(|content| content.model_turn.as_ref())
            .flat_map(|turn| turn.parts.iter())
            .filter_map(|part| part.inline_data.as_ref())
            .filter(|data| data.is_audio() && !data.data.is_empty())
    }
}
