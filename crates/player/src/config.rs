//! Player configuration from environment variables.
//!
//! Every setting has a default; a value that fails to parse falls back to the
//! default with a warning rather than refusing to start.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sleuth_domain::{ScriptId, DEFAULT_MAX_NARRATION_CHARS};

use crate::application::narration::{NarrationConfig, DEFAULT_DRAIN_INTERVAL_MS};
use crate::application::SessionConfig;
use crate::infrastructure::synthesis::DEFAULT_SYNTHESIS_URL;
use crate::infrastructure::websocket::{
    ReconnectPolicy, TransportConfig, DEFAULT_RECONNECT_DELAY_MS,
};

pub const DEFAULT_WS_URL: &str = "ws://localhost:8000/ws/game";

/// Which audio output backs narration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioOutputKind {
    /// Device-less, paced by a timer
    #[default]
    Clocked,
    /// Default sound card; needs the `device-audio` feature
    Device,
}

impl FromStr for AudioOutputKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clocked" | "headless" => Ok(Self::Clocked),
            "device" | "cpal" => Ok(Self::Device),
            other => Err(format!("unknown audio output '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BackoffKind {
    Fixed,
    Exponential,
}

impl FromStr for BackoffKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(Self::Fixed),
            "exponential" => Ok(Self::Exponential),
            other => Err(format!("unknown backoff '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PlayerConfig {
    pub ws_url: String,
    pub tts_url: String,
    pub reconnect: ReconnectPolicy,
    pub narration: NarrationConfig,
    pub audio_output: AudioOutputKind,
    /// Script the headless binary starts on launch.
    pub script_id: Option<ScriptId>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            ws_url: DEFAULT_WS_URL.to_string(),
            tts_url: DEFAULT_SYNTHESIS_URL.to_string(),
            reconnect: ReconnectPolicy::default(),
            narration: NarrationConfig::default(),
            audio_output: AudioOutputKind::default(),
            script_id: None,
        }
    }
}

impl PlayerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let delay_ms = parse_or(&get, "SLEUTH_RECONNECT_DELAY_MS", DEFAULT_RECONNECT_DELAY_MS);
        let reconnect = match parse_or(&get, "SLEUTH_RECONNECT_BACKOFF", BackoffKind::Fixed) {
            BackoffKind::Fixed => ReconnectPolicy::Fixed { delay_ms },
            BackoffKind::Exponential => ReconnectPolicy::exponential(delay_ms),
        };

        let drain_ms = parse_or(&get, "SLEUTH_DRAIN_INTERVAL_MS", DEFAULT_DRAIN_INTERVAL_MS);
        let narration = NarrationConfig {
            enabled: parse_or(&get, "SLEUTH_NARRATION_ENABLED", true),
            max_chars: parse_or(
                &get,
                "SLEUTH_NARRATION_MAX_CHARS",
                DEFAULT_MAX_NARRATION_CHARS,
            ),
            drain_interval: Duration::from_millis(drain_ms.max(1)),
        };

        Self {
            ws_url: get("SLEUTH_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
            tts_url: get("SLEUTH_TTS_URL").unwrap_or_else(|| DEFAULT_SYNTHESIS_URL.to_string()),
            reconnect,
            narration,
            audio_output: parse_or(&get, "SLEUTH_AUDIO_OUTPUT", AudioOutputKind::default()),
            script_id: get("SLEUTH_SCRIPT_ID").and_then(|raw| match raw.parse::<i64>() {
                Ok(id) => Some(ScriptId::new(id)),
                Err(e) => {
                    tracing::warn!(value = %raw, "Ignoring invalid SLEUTH_SCRIPT_ID: {}", e);
                    None
                }
            }),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            transport: TransportConfig {
                url: self.ws_url.clone(),
                reconnect: self.reconnect,
            },
            narration: self.narration.clone(),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => default,
        Some(raw) => match raw.parse::<T>() {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, value = %raw, "Invalid setting, using default: {}", e);
                default
            }
        },
    }
}

/// Load `.env.local` then `.env` from `dir`, without overriding variables already set.
pub fn load_dotenv_from(dir: &Path) {
    // Prefer local overrides.
    for filename in [".env.local", ".env"] {
        let path = dir.join(filename);
        if path.exists() {
            let _ = dotenvy::from_path(path);
        }
    }
}
