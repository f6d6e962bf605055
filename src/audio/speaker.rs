//! Default output device rendering through cpal

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::decode::DecodedChunk;
use super::resample::ChunkConverter;

/// Plays chunks handed over by [`ClockedOutput`](super::ClockedOutput),
/// converted to mono at the device rate
pub struct Speaker {
    running: Arc<AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl Speaker {
    /// Start rendering chunks to the default device
    pub fn start(mut chunks: mpsc::UnboundedReceiver<DecodedChunk>) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("No output device available")?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .context("Failed to get output config")?
            .into();

        info!(
            "Using output device: {} ({}Hz, {} channel(s))",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            config.sample_rate.0,
            config.channels
        );

        let buffer = Arc::new(Mutex::new(VecDeque::<f32>::new()));
        let mut converter = ChunkConverter::new(config.sample_rate.0);

        let feed = Arc::clone(&buffer);
        tokio::spawn(async move {
            while let Some(chunk) = chunks.recv().await {
                match converter.convert(&chunk.samples, chunk.sample_rate, chunk.channels) {
                    Ok(samples) => feed.lock().extend(samples),
                    Err(e) => warn!("Skipping unplayable chunk: {:#}", e),
                }
            }
        });

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("loqa-live-speaker".into())
            .spawn(move || {
                let channels = config.channels as usize;
                let stream = device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let mut buf = buffer.lock();
                        for frame in data.chunks_mut(channels) {
                            let sample = buf.pop_front().unwrap_or(0.0);
                            frame.fill(sample);
                        }
                    },
                    |err| error!("Audio output stream error: {}", err),
                    None,
                );

                let stream = match stream {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!("Failed to build output stream: {}", e);
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    error!("Failed to start output stream: {}", e);
                    return;
                }

                while thread_running.load(Ordering::SeqCst) {
                    std::thread::sleep(Duration::from_millis(50));
                }
            })
            .context("Failed to spawn speaker thread")?;

        Ok(Self {
            running,
            thread: Some(thread),
        })
    }
}

impl Drop for Speaker {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
