use anyhow::Result;
use serde::Deserialize;

use crate::session::Mood;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

/// Remote model service and session policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LiveConfig {
    pub nats_url: String,
    pub subject_prefix: String,
    pub model: String,
    pub voice: String,
    pub reconnect_delay_ms: u64,
    pub grounding_link_cap: usize,
    pub mood_tags: Vec<Mood>,
    pub max_decodes_in_flight: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    /// Samples per outbound wire frame
    pub frame_size: usize,
    pub buffer_duration_ms: u64,
    /// `microphone` or a path to a WAV file
    pub source: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-live".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3060,
        }
    }
}

impl Default for LiveConfig {
    fn default() -> Self {
        Self {
            nats_url: "nats://localhost:4222".to_string(),
            subject_prefix: "live".to_string(),
            model: "gemini-2.5-flash-native-audio-preview-12-2025".to_string(),
            voice: "Kore".to_string(),
            reconnect_delay_ms: 2000,
            grounding_link_cap: 5,
            mood_tags: Mood::ALL.to_vec(),
            max_decodes_in_flight: 8,
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 2048,
            buffer_duration_ms: 100,
            source: "microphone".to_string(),
        }
    }
}

impl Config {
    /// Load from `<path>.toml` (optional) layered under `LOQA_LIVE__*` env vars
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LOQA_LIVE").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_observed_design() {
        let cfg = Config::default();
        assert_eq!(cfg.audio.input_sample_rate, 16000);
        assert_eq!(cfg.audio.output_sample_rate, 24000);
        assert_eq!(cfg.live.reconnect_delay_ms, 2000);
        assert_eq!(cfg.live.grounding_link_cap, 5);
        assert_eq!(cfg.live.mood_tags.len(), 5);
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("live.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "[live]\nreconnect_delay_ms = 500\nmood_tags = [\"neutral\", \"sad\"]")?;

        let base = dir.path().join("live");
        let cfg = Config::load(base.to_str().unwrap_or_default())?;

        assert_eq!(cfg.live.reconnect_delay_ms, 500);
        assert_eq!(cfg.live.mood_tags, vec![Mood::Neutral, Mood::Sad]);
        assert_eq!(cfg.audio.frame_size, 2048);
        assert_eq!(cfg.service.http.port, 3060);
        Ok(())
    }
}
