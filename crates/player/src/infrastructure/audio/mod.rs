//! Audio decoding and playback.

mod clocked;
mod decoder;
#[cfg(feature = "device-audio")]
mod device;
mod engine;

pub use clocked::{ClockedOutput, ClockedOutputFactory};
pub use decoder::{decode_pcm16_base64, pcm16_le_to_f32, DecodeError};
#[cfg(feature = "device-audio")]
pub use device::{CpalOutput, CpalOutputFactory};
pub use engine::{AudioPlaybackEngine, ClipOutcome, PlaybackError};
