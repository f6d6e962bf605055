//! PCM capture adapter
//!
//! Turns whatever the capture backend produces into fixed-size mono frames at
//! the wire sample rate, encoded as base64 little-endian PCM16.

use anyhow::Result;
use base64::Engine;

use super::backend::AudioFrame;
use super::resample::{downmix, AudioResampler};
use crate::protocol::Blob;

/// Convert a float sample in [-1.0, 1.0] to PCM16
pub fn f32_to_pcm16(sample: f32) -> i16 {
    let clamped = sample.clamp(-1.0, 1.0);
    (clamped * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

fn pcm16_to_f32(sample: i16) -> f32 {
    sample as f32 / 32768.0
}

/// Re-frames captured audio into wire frames of `frame_size` samples
pub struct PcmCapture {
    target_sample_rate: u32,
    frame_size: usize,
    /// Built for the first source rate that differs from the wire rate
    resampler: Option<AudioResampler>,
    pending: Vec<i16>,
}

impl PcmCapture {
    pub fn new(target_sample_rate: u32, frame_size: usize) -> Self {
        Self {
            target_sample_rate,
            frame_size: frame_size.max(1),
            resampler: None,
            pending: Vec::with_capacity(frame_size * 2),
        }
    }

    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.target_sample_rate)
    }

    /// Feed one captured frame; returns every wire frame that is now complete
    pub fn push(&mut self, frame: AudioFrame) -> Result<Vec<Blob>> {
        let samples: Vec<f32> = frame.samples.iter().map(|&s| pcm16_to_f32(s)).collect();
        let mono = downmix(&samples, frame.channels);

        let converted = if frame.sample_rate == self.target_sample_rate {
            mono
        } else {
            self.resampler_for(frame.sample_rate)?.process(&mono)?
        };
        self.pending
            .extend(converted.into_iter().map(f32_to_pcm16));

        let mut out = Vec::new();
        while self.pending.len() >= self.frame_size {
            let rest = self.pending.split_off(self.frame_size);
            let full = std::mem::replace(&mut self.pending, rest);
            out.push(self.encode(&full));
        }
        Ok(out)
    }

    /// Samples waiting for a full frame
    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    /// Drop buffered samples and resampler history
    pub fn clear(&mut self) {
        self.pending.clear();
        if let Some(resampler) = self.resampler.as_mut() {
            resampler.reset();
        }
    }

    fn resampler_for(&mut self, source_rate: u32) -> Result<&mut AudioResampler> {
        let resampler = match self.resampler.take() {
            Some(resampler) if resampler.input_rate() == source_rate => resampler,
            _ => AudioResampler::new(source_rate, self.target_sample_rate, 1)?,
        };
        Ok(self.resampler.insert(resampler))
    }

    fn encode(&self, samples: &[i16]) -> Blob {
        let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        Blob {
            mime_type: self.mime_type(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }
}
