//! Speech Synthesis Port - streamed text-to-speech

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use thiserror::Error;

use sleuth_shared::{SynthesisChunk, SynthesisRequest};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SynthesisError {
    #[error("Failed to build synthesis client: {0}")]
    ClientSetup(String),

    #[error("Synthesis request failed: {0}")]
    RequestFailed(String),

    #[error("Synthesis endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Synthesis stream interrupted: {0}")]
    Stream(String),

    #[error("Invalid synthesis chunk: {0}")]
    InvalidChunk(String),
}

/// Chunks of one utterance, in arrival order.
pub type AudioChunkStream = BoxStream<'static, Result<SynthesisChunk, SynthesisError>>;

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait SpeechSynthesisPort: Send + Sync {
    /// Start synthesizing `request`; chunks are yielded as the server produces them.
    async fn stream_speech(&self, request: SynthesisRequest)
        -> Result<AudioChunkStream, SynthesisError>;
}
