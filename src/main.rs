use anyhow::{Context, Result};
use clap::Parser;
use loqa_live::{create_router, AppState, ClockedOutput, Config, PlaybackOutput, UserProfile};
use std::sync::Arc;
use tracing::{info, warn, Level};

/// Realtime voice assistant session manager
#[derive(Parser, Debug)]
#[command(name = "loqa-live", version, about)]
struct Args {
    /// Configuration file (without extension)
    #[arg(long, default_value = "config/loqa-live")]
    config: String,

    /// Start a session immediately for this user
    #[arg(long, requires = "subject")]
    user: Option<String>,

    /// Subject of the immediate session
    #[arg(long, requires = "user")]
    subject: Option<String>,

    /// Capture from a WAV file instead of the microphone
    #[arg(long)]
    wav: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let mut cfg = Config::load(&args.config)?;
    if let Some(wav) = args.wav {
        cfg.audio.source = wav;
    }

    info!("Loqa Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Model relay: {} (prefix {})", cfg.live.nats_url, cfg.live.subject_prefix);
    info!("Capture source: {}", cfg.audio.source);

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let (output, _speaker) = playback_output()?;
    let state = AppState::with_output(cfg, output);

    if let (Some(user_name), Some(subject)) = (args.user, args.subject) {
        state
            .start_session(UserProfile { user_name, subject })
            .await
            .context("Failed to start live session")?;
    }

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, create_router(state.clone()))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await?;

    match state.stop_session().await {
        Ok(stats) => info!(
            "Session ended: {:.1}s, {} frames sent, {} chunks played",
            stats.duration_secs, stats.frames_sent, stats.chunks_scheduled
        ),
        Err(e) => warn!("{:#}", e),
    }

    Ok(())
}

#[cfg(feature = "audio-io")]
fn playback_output() -> Result<(Arc<dyn PlaybackOutput>, Option<loqa_live::audio::Speaker>)> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let speaker = loqa_live::audio::Speaker::start(rx)?;
    Ok((Arc::new(ClockedOutput::with_renderer(tx)), Some(speaker)))
}

#[cfg(not(feature = "audio-io"))]
fn playback_output() -> Result<(Arc<dyn PlaybackOutput>, Option<()>)> {
    info!("Built without audio-io, playback is timed but silent");
    Ok((Arc::new(ClockedOutput::new()), None))
}
