use base64::Engine;
use std::io::Cursor;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::DecodeError;
use crate::protocol::InlineData;

/// Decoded audio ready for the playback timeline
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedChunk {
    /// Interleaved samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

impl DecodedChunk {
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Playback length in seconds on the output clock
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.duration_secs())
    }
}

/// Decodes one inbound audio payload; may suspend
#[async_trait::async_trait]
pub trait AudioDecoder: Send + Sync {
    async fn decode(&self, payload: InlineData) -> Result<DecodedChunk, DecodeError>;
}

/// Default decoder: raw `audio/pcm` (base64 PCM16 LE) or any container
/// symphonia can probe
#[derive(Debug, Clone)]
pub struct PayloadDecoder {
    default_sample_rate: u32,
}

impl PayloadDecoder {
    pub fn new(default_sample_rate: u32) -> Self {
        Self {
            default_sample_rate,
        }
    }

    /// Synchronous decode; `decode` runs this on the blocking pool
    pub fn decode_blocking(&self, payload: &InlineData) -> Result<DecodedChunk, DecodeError> {
        if payload.data.is_empty() {
            return Err(DecodeError::Empty);
        }

        let bytes = base64::engine::general_purpose::STANDARD.decode(payload.data.trim())?;
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }

        let mime = MimeType::parse(&payload.mime_type);
        if mime.is_raw_pcm() {
            let sample_rate = mime.param("rate").unwrap_or(self.default_sample_rate);
            let channels = mime.param("channels").unwrap_or(1) as u16;
            decode_pcm16(&bytes, sample_rate, channels)
        } else {
            decode_container(bytes, &mime.essence)
        }
    }
}

#[async_trait::async_trait]
impl AudioDecoder for PayloadDecoder {
    async fn decode(&self, payload: InlineData) -> Result<DecodedChunk, DecodeError> {
        let decoder = self.clone();
        tokio::task::spawn_blocking(move || decoder.decode_blocking(&payload))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

struct MimeType {
    essence: String,
    params: Vec<(String, String)>,
}

impl MimeType {
    fn parse(value: &str) -> Self {
        let mut parts = value.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
            .collect();
        Self { essence, params }
    }

    fn is_raw_pcm(&self) -> bool {
        matches!(self.essence.as_str(), "" | "audio/pcm" | "audio/l16")
    }

    fn param(&self, name: &str) -> Option<u32> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .and_then(|(_, v)| v.parse().ok())
    }
}

fn decode_pcm16(bytes: &[u8], sample_rate: u32, channels: u16) -> Result<DecodedChunk, DecodeError> {
    if bytes.len() % 2 != 0 {
        return Err(DecodeError::OddLength(bytes.len()));
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]) as f32 / 32768.0)
        .collect();

    Ok(DecodedChunk {
        samples,
        sample_rate,
        channels: channels.max(1),
    })
}

fn decode_container(bytes: Vec<u8>, mime: &str) -> Result<DecodedChunk, DecodeError> {
    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

    let mut hint = Hint::new();
    if !mime.is_empty() {
        hint.mime_type(mime);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        stream,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| DecodeError::UnsupportedFormat(format!("{} has no audio track", mime)))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;
    let mut sample_rate = params.sample_rate.unwrap_or(0);
    let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(1);
    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        sample_rate = spec.rate;
        channels = spec.channels.count() as u16;

        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if samples.is_empty() || sample_rate == 0 {
        return Err(DecodeError::Empty);
    }

    Ok(DecodedChunk {
        samples,
        sample_rate,
        channels,
    })
}
