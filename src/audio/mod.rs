pub mod backend;
pub mod capture;
pub mod decode;
pub mod file;
pub mod output;
pub mod resample;
pub mod scheduler;

#[cfg(feature = "audio-io")]
pub mod microphone;
#[cfg(feature = "audio-io")]
pub mod speaker;

pub use backend::{AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, ChannelBackend};
pub use capture::{f32_to_pcm16, PcmCapture};
pub use decode::{AudioDecoder, DecodedChunk, PayloadDecoder};
pub use file::{AudioFile, FileBackend};
pub use output::{ClockedOutput, PlaybackHandle, PlaybackId, PlaybackOutput};
pub use resample::{downmix, AudioResampler, ChunkConverter};
pub use scheduler::{PlaybackScheduler, ScheduledChunk};

#[cfg(feature = "audio-io")]
pub use microphone::MicrophoneBackend;
#[cfg(feature = "audio-io")]
pub use speaker::Speaker;
