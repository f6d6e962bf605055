//! Default input device capture through cpal

use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use super::backend::{AudioBackend, AudioBackendConfig, AudioFrame};
use super::capture::f32_to_pcm16;
use crate::error::LiveError;

/// Microphone capture
///
/// cpal streams are not `Send`, so the stream lives on its own thread for
/// as long as capture runs.
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    device_name: String,
    capturing: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    /// Fails with [`LiveError::MicrophoneUnavailable`] if there is no input device
    pub fn new(config: AudioBackendConfig) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or_else(|| LiveError::MicrophoneUnavailable("no input device available".into()))?;

        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        device.default_input_config().map_err(|e| {
            LiveError::MicrophoneUnavailable(format!("{}: {}", device_name, e))
        })?;

        info!("Using input device: {}", device_name);

        Ok(Self {
            config,
            device_name,
            capturing: Arc::new(AtomicBool::new(false)),
            thread: None,
        })
    }
}

#[async_trait::async_trait]
impl AudioBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.capturing.load(Ordering::SeqCst) {
            bail!("Already capturing");
        }

        let frames_per_sec = 1000 / self.config.buffer_duration_ms.max(1) as usize;
        let (tx, rx) = mpsc::channel(frames_per_sec.max(8) * 2);
        let (ready_tx, ready_rx) = oneshot::channel::<Result<()>>();
        let capturing = Arc::clone(&self.capturing);
        capturing.store(true, Ordering::SeqCst);

        let handle = std::thread::Builder::new()
            .name("loqa-live-mic".into())
            .spawn(move || run_input_stream(tx, capturing, ready_tx))
            .context("Failed to spawn capture thread")?;
        self.thread = Some(handle);

        match ready_rx.await {
            Ok(Ok(())) => Ok(rx),
            Ok(Err(e)) => {
                self.stop().await?;
                Err(e)
            }
            Err(_) => {
                self.stop().await?;
                Err(LiveError::Capture("capture thread exited".into()).into())
            }
        }
    }

    async fn stop(&mut self) -> Result<()> {
        self.capturing.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread.take() {
            tokio::task::spawn_blocking(move || handle.join())
                .await
                .context("Failed to join capture thread")?
                .map_err(|_| LiveError::Capture("capture thread panicked".into()))?;
            info!("Microphone released: {}", self.device_name);
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    fn name(&self) -> &str {
        "microphone"
    }
}

fn run_input_stream(
    tx: mpsc::Sender<AudioFrame>,
    capturing: Arc<AtomicBool>,
    ready: oneshot::Sender<Result<()>>,
) {
    let stream = match build_input_stream(tx, Arc::clone(&capturing)) {
        Ok(stream) => stream,
        Err(e) => {
            capturing.store(false, Ordering::SeqCst);
            let _ = ready.send(Err(e));
            return;
        }
    };

    if let Err(e) = stream.play() {
        capturing.store(false, Ordering::SeqCst);
        let _ = ready.send(Err(LiveError::Capture(format!("failed to start input stream: {}", e)).into()));
        return;
    }
    let _ = ready.send(Ok(()));

    while capturing.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(50));
    }
    drop(stream);
    debug!("Input stream closed");
}

fn build_input_stream(tx: mpsc::Sender<AudioFrame>, capturing: Arc<AtomicBool>) -> Result<cpal::Stream> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| LiveError::MicrophoneUnavailable("no input device available".into()))?;
    let config: cpal::StreamConfig = device
        .default_input_config()
        .map_err(|e| LiveError::MicrophoneUnavailable(e.to_string()))?
        .into();

    let sample_rate = config.sample_rate.0;
    let channels = config.channels;
    info!("Audio config: {}Hz, {} channel(s)", sample_rate, channels);

    let captured = AtomicU64::new(0);

    let stream = device
        .build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !capturing.load(Ordering::SeqCst) {
                    return;
                }

                let offset = captured.fetch_add(data.len() as u64, Ordering::Relaxed);
                let timestamp_ms = offset / channels.max(1) as u64 * 1000 / sample_rate.max(1) as u64;

                let frame = AudioFrame {
                    samples: data.iter().copied().map(f32_to_pcm16).collect(),
                    sample_rate,
                    channels,
                    timestamp_ms,
                };
                if tx.try_send(frame).is_err() {
                    warn!("Capture consumer is behind, dropping input frame");
                }
            },
            |err| error!("Audio input stream error: {}", err),
            None,
        )
        .map_err(|e| LiveError::Capture(format!("failed to build input stream: {}", e)))?;

    Ok(stream)
}
