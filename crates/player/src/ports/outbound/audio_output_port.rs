//! Audio Output Port - the platform sound output context
//!
//! An output plays one buffer at a time. `play_buffer` resolves when the
//! buffer has finished sounding or was cut short by `stop`.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AudioError {
    #[error("Audio output is not initialized")]
    NotInitialized,

    #[error("Audio device error: {0}")]
    Device(String),

    #[error("Audio backend unavailable: {0}")]
    Unavailable(String),
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait AudioOutputPort: Send + Sync {
    /// Whether the context was created (or left) in a suspended state.
    fn is_suspended(&self) -> bool;

    fn resume(&self) -> Result<(), AudioError>;

    /// Play mono samples at `sample_rate`, completing when playback of this buffer ends.
    async fn play_buffer(&self, samples: Vec<f32>, sample_rate: u32) -> Result<(), AudioError>;

    /// Silence the current buffer immediately and drop anything pending.
    fn stop(&self);
}

/// Creates the output context on first use.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AudioOutputFactory: Send + Sync {
    fn create(&self) -> Result<Arc<dyn AudioOutputPort>, AudioError>;
}
