use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::turn::Mood;
use crate::config::Config;
use crate::protocol::SessionSetup;

/// Configuration for a live session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model endpoint identity
    pub model: String,

    /// Prebuilt voice for synthesized speech
    pub voice: String,

    /// Sample rate of outbound microphone audio
    pub input_sample_rate: u32,

    /// Sample rate assumed for inbound raw PCM without a rate parameter
    pub output_sample_rate: u32,

    /// Samples per outbound wire frame
    pub frame_size: usize,

    /// Fixed delay before every reconnect attempt
    pub reconnect_delay: Duration,

    /// Most recent citations kept
    pub grounding_link_cap: usize,

    /// Mood tags honoured in assistant text
    pub mood_tags: Vec<Mood>,

    /// Decodes allowed in flight at once
    pub max_decodes_in_flight: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Kore".to_string(),
            input_sample_rate: 16000,  // 16kHz mono upstream
            output_sample_rate: 24000, // 24kHz mono downstream
            frame_size: 2048,          // ~128ms at 16kHz
            reconnect_delay: Duration::from_millis(2000),
            grounding_link_cap: 5,
            mood_tags: Mood::ALL.to_vec(),
            max_decodes_in_flight: 8,
        }
    }
}

impl From<&Config> for SessionConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            model: cfg.live.model.clone(),
            voice: cfg.live.voice.clone(),
            input_sample_rate: cfg.audio.input_sample_rate,
            output_sample_rate: cfg.audio.output_sample_rate,
            frame_size: cfg.audio.frame_size,
            reconnect_delay: Duration::from_millis(cfg.live.reconnect_delay_ms),
            grounding_link_cap: cfg.live.grounding_link_cap,
            mood_tags: cfg.live.mood_tags.clone(),
            max_decodes_in_flight: cfg.live.max_decodes_in_flight,
        }
    }
}

/// Who the assistant is talking to, collected before the session starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_name: String,
    pub subject: String,
}

impl UserProfile {
    /// Scripted request sent on every successful open
    pub fn greeting(&self) -> String {
        format!(
            "Say exactly: \"Hi {}, how can I help you with {}?\"",
            self.user_name, self.subject
        )
    }

    pub fn system_instruction(&self) -> String {
        format!(
            "CONTEXT:\n\
             User name: {name}\n\
             Subject: {subject}\n\
             \n\
             Answer as a friendly, concise study assistant. Give direct, useful answers \
             and use search when the question needs current facts.\n\
             \n\
             When the user asks for a story, switch to a storyteller voice and mark the \
             emotion of each passage with one of these inline markers: \
             [MOOD:SAD], [MOOD:GOOD], [MOOD:MYSTICAL], [MOOD:ANGRY], and [MOOD:NEUTRAL] \
             to return to calm. Markers are hidden from the user. Do not use them outside \
             of stories.",
            name = self.user_name,
            subject = self.subject,
        )
    }
}

impl SessionConfig {
    pub fn setup_for(&self, profile: &UserProfile) -> SessionSetup {
        SessionSetup {
            model: self.model.clone(),
            voice: self.voice.clone(),
            system_instruction: profile.system_instruction(),
            response_modalities: vec!["AUDIO".to_string()],
            input_audio_transcription: true,
            output_audio_transcription: true,
            search_tool: true,
        }
    }
}

/// Text injected when an external document summary is ready
pub fn document_notification(name: &str, summary: &str) -> String {
    format!(
        "SYSTEM NOTIFICATION: Document \"{}\" uploaded. Summary: {}",
        name, summary
    )
}
