//! Sleuth Player - headless composition root.
//!
//! Connects to the game server, optionally starts a script, and logs the
//! narrative timeline and narration status until Ctrl-C.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sleuth_player::config::load_dotenv_from;
use sleuth_player::infrastructure::audio::ClockedOutputFactory;
use sleuth_player::infrastructure::synthesis::HttpSpeechSynthesizer;
use sleuth_player::infrastructure::websocket::TungsteniteConnector;
use sleuth_player::ports::outbound::{AudioOutputFactory, SystemRandom, SystemTime};
use sleuth_player::{
    AudioOutputKind, PlayerConfig, SessionCoordinator, SessionDependencies, SessionEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Repo root first (cargo run from the workspace), then the working directory.
    load_dotenv_from(&Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(".."));
    load_dotenv_from(Path::new("."));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sleuth_player=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Sleuth Player");

    let config = PlayerConfig::from_env();
    tracing::info!(
        ws_url = %config.ws_url,
        tts_url = %config.tts_url,
        audio = ?config.audio_output,
        narration = config.narration.enabled,
        "Configuration loaded"
    );

    let synthesizer = HttpSpeechSynthesizer::new(&config.tts_url)
        .context("failed to build speech synthesis client")?;

    let coordinator = SessionCoordinator::spawn(
        SessionDependencies {
            connector: Arc::new(TungsteniteConnector::new()),
            synthesizer: Arc::new(synthesizer),
            audio: audio_factory(config.audio_output),
            clock: Arc::new(SystemTime),
            random: Arc::new(SystemRandom),
        },
        config.session_config(),
    );

    // No user gesture to wait for when headless
    coordinator
        .initialize_audio()
        .context("failed to initialize audio output")?;

    coordinator.events().subscribe(log_session_event).await;

    match config.script_id {
        Some(script_id) => coordinator.start_game(script_id),
        None => {
            tracing::warn!("SLEUTH_SCRIPT_ID not set; connecting without starting a script");
            coordinator.connect();
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    tracing::info!("Shutting down");
    coordinator.shutdown().await;
    Ok(())
}

fn audio_factory(kind: AudioOutputKind) -> Arc<dyn AudioOutputFactory> {
    match kind {
        AudioOutputKind::Clocked => Arc::new(ClockedOutputFactory::default()),
        #[cfg(feature = "device-audio")]
        AudioOutputKind::Device => Arc::new(
            sleuth_player::infrastructure::audio::CpalOutputFactory::new(
                sleuth_shared::SYNTHESIS_SAMPLE_RATE,
            ),
        ),
        #[cfg(not(feature = "device-audio"))]
        AudioOutputKind::Device => {
            tracing::warn!("Built without the device-audio feature; using clocked output");
            Arc::new(ClockedOutputFactory::default())
        }
    }
}

fn log_session_event(event: SessionEvent) {
    match event {
        SessionEvent::Connected { session_id } => {
            tracing::info!(session_id = %session_id, "Connected");
        }
        SessionEvent::Disconnected { intentional } => {
            tracing::info!(intentional, "Disconnected");
        }
        SessionEvent::StateChanged(Some(state)) => {
            match state.last_event() {
                Some(entry) => tracing::info!(
                    phase = %state.phase,
                    "{}: {}",
                    entry.character,
                    entry.content
                ),
                None => tracing::info!(phase = %state.phase, "Game state received"),
            }
        }
        SessionEvent::StateChanged(None) => tracing::info!("Game reset"),
        SessionEvent::NarrationChanged(Some(handle)) => {
            tracing::debug!(character = %handle.character, "Speaking");
        }
        SessionEvent::NarrationChanged(None) => tracing::debug!("Narration idle"),
        SessionEvent::GameEnded { message } => tracing::info!("Game over: {}", message),
        SessionEvent::ServerError { message } => tracing::error!("Server error: {}", message),
    }
}
