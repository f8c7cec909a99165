//! Scripted synthesizer for narration and coordinator tests.

use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use futures_util::{stream, StreamExt};

use sleuth_shared::{SynthesisChunk, SynthesisRequest};

use crate::ports::outbound::{AudioChunkStream, SpeechSynthesisPort, SynthesisError};

/// Answers every request with `chunks` silent chunks of `chunk_samples` samples.
pub(crate) struct ScriptedSynthesizer {
    requests: Mutex<Vec<SynthesisRequest>>,
    chunks: usize,
    chunk_samples: usize,
    failing: Vec<String>,
}

impl ScriptedSynthesizer {
    pub(crate) fn new(chunks: usize, chunk_samples: usize) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            chunks,
            chunk_samples,
            failing: Vec::new(),
        }
    }

    /// Requests for `character` fail with HTTP 500.
    pub(crate) fn failing_for(mut self, character: &str) -> Self {
        self.failing.push(character.to_string());
        self
    }

    pub(crate) fn requests(&self) -> Vec<SynthesisRequest> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl SpeechSynthesisPort for ScriptedSynthesizer {
    async fn stream_speech(
        &self,
        request: SynthesisRequest,
    ) -> Result<AudioChunkStream, SynthesisError> {
        let failing = self.failing.contains(&request.character);
        self.requests.lock().expect("requests lock").push(request);
        if failing {
            return Err(SynthesisError::Status {
                status: 500,
                body: "voice unavailable".into(),
            });
        }

        let audio = STANDARD.encode(vec![0u8; self.chunk_samples * 2]);
        let chunks = (0..self.chunks).map(move |_| {
            Ok(SynthesisChunk {
                audio: audio.clone(),
            })
        });
        Ok(stream::iter(chunks).boxed())
    }
}
