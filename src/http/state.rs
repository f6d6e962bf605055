use crate::audio::{AudioBackendConfig, AudioBackendFactory, AudioSource, PayloadDecoder, PlaybackOutput};
use crate::config::Config;
use crate::error::LiveError;
use crate::nats::NatsConnector;
use crate::session::{LiveSession, SessionConfig, SessionParts, SessionStats, UserProfile};
use anyhow::Result;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Builds the collaborators for a new session
pub type PartsBuilder = Arc<dyn Fn(&Config) -> Result<SessionParts> + Send + Sync>;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// The live session, if one is running
    pub session: Arc<RwLock<Option<LiveSession>>>,

    pub config: Arc<Config>,

    build_parts: PartsBuilder,
}

impl AppState {
    pub fn new(config: Config, build_parts: PartsBuilder) -> Self {
        Self {
            session: Arc::new(RwLock::new(None)),
            config: Arc::new(config),
            build_parts,
        }
    }

    /// NATS transport, configured capture source and `output` for playback
    pub fn with_output(config: Config, output: Arc<dyn PlaybackOutput>) -> Self {
        let build_parts: PartsBuilder = Arc::new(move |cfg: &Config| {
            let backend_config = AudioBackendConfig {
                target_sample_rate: cfg.audio.input_sample_rate,
                target_channels: 1,
                buffer_duration_ms: cfg.audio.buffer_duration_ms,
            };
            let backend = AudioBackendFactory::create(AudioSource::parse(&cfg.audio.source), backend_config)?;

            Ok(SessionParts {
                connector: Arc::new(NatsConnector::from(&cfg.live)),
                backend,
                decoder: Arc::new(PayloadDecoder::new(cfg.audio.output_sample_rate)),
                output: Arc::clone(&output),
            })
        });
        Self::new(config, build_parts)
    }

    /// Start the session unless one is already running
    pub async fn start_session(&self, profile: UserProfile) -> Result<()> {
        let mut slot = self.session.write().await;
        if slot.is_some() {
            return Err(LiveError::AlreadyRunning.into());
        }

        let parts = (self.build_parts)(&self.config)?;
        let session = LiveSession::start(SessionConfig::from(self.config.as_ref()), profile, parts).await?;
        *slot = Some(session);

        info!("Live session started");
        Ok(())
    }

    /// Shut the running session down and return its final statistics
    pub async fn stop_session(&self) -> Result<SessionStats> {
        let session = self
            .session
            .write()
            .await
            .take()
            .ok_or(LiveError::NotRunning)?;
        session.shutdown().await
    }
}
