//! Sample rate conversion
//!
//! Capture streams through [`AudioResampler::process`] so consecutive frames
//! stay continuous. Playback converts each decoded chunk on its own with
//! [`ChunkConverter`], since chunks may differ in rate and layout.

use anyhow::{anyhow, bail, Result};
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use tracing::debug;

/// Input frames per resampler call
const CHUNK_FRAMES: usize = 1024;

/// Zero chunks a flush may push through to drain the filter
const MAX_FLUSH_ROUNDS: usize = 4;

/// Sinc resampler over interleaved f32 samples
pub struct AudioResampler {
    resampler: SincFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Planar input waiting for a full chunk
    pending: Vec<Vec<f32>>,
    /// Frames fed and produced since the last reset
    frames_in: u64,
    frames_out: u64,
}

impl AudioResampler {
    pub fn new(input_rate: u32, output_rate: u32, channels: u16) -> Result<Self> {
        if input_rate == 0 || output_rate == 0 {
            bail!("Sample rates must be greater than 0");
        }
        if channels == 0 {
            bail!("Number of channels must be greater than 0");
        }

        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let resampler = SincFixedIn::<f32>::new(
            output_rate as f64 / input_rate as f64,
            2.0,
            params,
            CHUNK_FRAMES,
            channels as usize,
        )
        .map_err(|e| anyhow!("Failed to create resampler: {}", e))?;

        debug!(
            "Created resampler: {} Hz -> {} Hz, {} channel(s)",
            input_rate, output_rate, channels
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels: channels as usize,
            pending: vec![Vec::with_capacity(CHUNK_FRAMES); channels as usize],
            frames_in: 0,
            frames_out: 0,
        })
    }

    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Feed interleaved samples; returns output for every completed chunk.
    /// A partial chunk is held until more input (or [`flush`](Self::flush)).
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mut output = Vec::new();

        for frame in input.chunks_exact(self.channels) {
            for (channel, &sample) in self.pending.iter_mut().zip(frame) {
                channel.push(sample);
            }

            if self.pending[0].len() == CHUNK_FRAMES {
                let planar = self
                    .resampler
                    .process(&self.pending, None)
                    .map_err(|e| anyhow!("Resampling failed: {}", e))?;
                interleave(&planar, planar[0].len(), &mut output);
                self.frames_in += CHUNK_FRAMES as u64;
                self.frames_out += planar[0].len() as u64;
                self.pending.iter_mut().for_each(Vec::clear);
            }
        }

        Ok(output)
    }

    /// Convert whatever is held back and drain the filter delay, then start
    /// over. Total output since the last reset comes to the input length
    /// times the rate ratio.
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        self.frames_in += self.pending[0].len() as u64;
        let ratio = self.output_rate as f64 / self.input_rate as f64;
        let target = (self.frames_in as f64 * ratio).round() as u64;

        let mut output = Vec::new();
        let mut rounds = 0;
        while self.frames_out < target && rounds < MAX_FLUSH_ROUNDS {
            for channel in self.pending.iter_mut() {
                channel.resize(CHUNK_FRAMES, 0.0);
            }
            let planar = self
                .resampler
                .process(&self.pending, None)
                .map_err(|e| anyhow!("Resampling failed: {}", e))?;

            let take = (target.saturating_sub(self.frames_out) as usize).min(planar[0].len());
            interleave(&planar, take, &mut output);
            self.frames_out += take as u64;
            self.pending.iter_mut().for_each(Vec::clear);
            rounds += 1;
        }

        self.reset();
        Ok(output)
    }

    /// Convert one self-contained block of audio
    pub fn resample_once(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        let mut output = self.process(input)?;
        output.extend(self.flush()?);
        Ok(output)
    }

    /// Drop held input and filter state
    pub fn reset(&mut self) {
        self.pending.iter_mut().for_each(Vec::clear);
        self.frames_in = 0;
        self.frames_out = 0;
        self.resampler.reset();
    }
}

fn interleave(planar: &[Vec<f32>], frames: usize, output: &mut Vec<f32>) {
    for frame in 0..frames {
        for channel in planar {
            output.push(channel[frame]);
        }
    }
}

/// Average interleaved channels down to mono
pub fn downmix(samples: &[f32], channels: u16) -> Vec<f32> {
    let channels = channels.max(1) as usize;
    if channels == 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Brings decoded chunks of any rate and layout to mono at one output rate
pub struct ChunkConverter {
    output_rate: u32,
    resampler: Option<AudioResampler>,
}

impl ChunkConverter {
    pub fn new(output_rate: u32) -> Self {
        Self {
            output_rate,
            resampler: None,
        }
    }

    pub fn convert(&mut self, samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<f32>> {
        let mono = downmix(samples, channels);
        if sample_rate == self.output_rate {
            return Ok(mono);
        }

        // Rebuilt only when the source rate changes
        let resampler = match self.resampler.take() {
            Some(resampler) if resampler.input_rate() == sample_rate => resampler,
            _ => AudioResampler::new(sample_rate, self.output_rate, 1)?,
        };
        self.resampler.insert(resampler).resample_once(&mono)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(frames: usize, rate: u32) -> Vec<f32> {
        (0..frames)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate as f32).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(AudioResampler::new(0, 16000, 1).is_err());
        assert!(AudioResampler::new(16000, 0, 1).is_err());
        assert!(AudioResampler::new(16000, 48000, 0).is_err());
    }

    #[test]
    fn test_one_second_at_44k1_becomes_one_second_at_16k() -> Result<()> {
        let mut resampler = AudioResampler::new(44100, 16000, 1)?;
        let output = resampler.resample_once(&tone(44100, 44100))?;

        assert!(
            (output.len() as i64 - 16000).abs() <= 1,
            "got {} samples",
            output.len()
        );
        Ok(())
    }

    #[test]
    fn test_streaming_holds_back_partial_chunk() -> Result<()> {
        let mut resampler = AudioResampler::new(48000, 16000, 1)?;

        assert!(resampler.process(&tone(1000, 48000))?.is_empty());
        let output = resampler.process(&tone(100, 48000))?;
        assert!(!output.is_empty());
        assert!(output.len() < 1100);

        resampler.reset();
        assert!(resampler.flush()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_downmix_averages_channels() {
        assert_eq!(downmix(&[0.25, 0.75, -1.0, 1.0], 2), vec![0.5, 0.0]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn test_converter_handles_stereo_at_another_rate() -> Result<()> {
        let mut converter = ChunkConverter::new(24000);

        // 0.1s of 48kHz stereo
        let stereo: Vec<f32> = tone(4800, 48000).iter().flat_map(|&s| [s, s]).collect();
        let mono = converter.convert(&stereo, 48000, 2)?;
        assert_eq!(mono.len(), 2400);

        // Already at the output rate: downmix only
        let same = converter.convert(&[0.5, 0.5], 24000, 2)?;
        assert_eq!(same, vec![0.5]);
        Ok(())
    }
}
