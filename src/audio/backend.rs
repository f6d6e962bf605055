use anyhow::{bail, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

/// Configuration for audio backend
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Target sample rate (the capture adapter resamples if needed)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Buffer size in milliseconds (affects latency)
    pub buffer_duration_ms: u64,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz wire format
            target_channels: 1,        // Mono
            buffer_duration_ms: 100,   // 100ms buffers
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`audio-io` feature)
/// - File: replay a WAV file in real time
/// - Channel: frames pushed by the caller (tests, embedding applications)
#[async_trait::async_trait]
pub trait AudioBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio and release the device
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create audio backend based on platform and configuration
    ///
    /// A missing microphone is reported as
    /// [`LiveError::MicrophoneUnavailable`](crate::error::LiveError::MicrophoneUnavailable).
    pub fn create(source: AudioSource, config: AudioBackendConfig) -> Result<Box<dyn AudioBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "audio-io")]
                {
                    let backend = super::microphone::MicrophoneBackend::new(config)?;
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "audio-io"))]
                {
                    let _ = config;
                    Err(crate::error::LiveError::MicrophoneUnavailable(
                        "built without the audio-io feature".to_string(),
                    )
                    .into())
                }
            }

            AudioSource::File(path) => {
                let backend = super::file::FileBackend::new(path, config)?;
                Ok(Box::new(backend))
            }
        }
    }
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default input device
    Microphone,
    /// WAV file replayed in real time
    File(String),
}

impl AudioSource {
    /// `microphone` (or empty) selects the device, anything else is a path
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "" | "microphone" | "mic" => AudioSource::Microphone,
            path => AudioSource::File(path.to_string()),
        }
    }
}

/// Backend fed by an in-process channel
pub struct ChannelBackend {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    capturing: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl ChannelBackend {
    /// Returns the backend and the sender that feeds it
    pub fn new(capacity: usize) -> (Self, mpsc::Sender<AudioFrame>) {
        let (tx, rx) = mpsc::channel(capacity);
        let backend = Self {
            frames: Some(rx),
            capturing: Arc::new(AtomicBool::new(false)),
            stopped: Arc::new(AtomicBool::new(false)),
        };
        (backend, tx)
    }

    /// Flag set once `stop` has been called
    pub fn stopped_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stopped)
    }
}

#[async_trait::async_trait]
impl AudioBackend for ChannelBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        match self.frames.take() {
            Some(rx) => {
                self.capturing.store(true, Ordering::SeqCst);
                Ok(rx)
            }
            None => bail!("Channel backend can only be started once"),
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "channel"
    }
}
