//! Streaming speech synthesis DTOs.
//!
//! The synthesis endpoint takes a [`SynthesisRequest`] and answers with
//! newline-delimited JSON, one [`SynthesisChunk`] per line.

use serde::{Deserialize, Serialize};

/// Sample rate of synthesized PCM audio.
pub const SYNTHESIS_SAMPLE_RATE: u32 = 24_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisRequest {
    pub text: String,
    pub character: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

/// One streamed line: base64 PCM16 little-endian mono at [`SYNTHESIS_SAMPLE_RATE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SynthesisChunk {
    pub audio: String,
}
