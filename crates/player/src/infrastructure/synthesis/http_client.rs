//! HTTP client for the streaming speech synthesis endpoint

use std::collections::VecDeque;
use std::fmt::Display;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{stream, Stream, StreamExt};
use reqwest::Client;

use sleuth_shared::{SynthesisChunk, SynthesisRequest};

use super::ndjson::NdjsonDecoder;
use crate::ports::outbound::{AudioChunkStream, SpeechSynthesisPort, SynthesisError};

/// Default synthesis endpoint.
pub const DEFAULT_SYNTHESIS_URL: &str = "http://localhost:8000/api/tts/stream";

/// Posts text to the synthesis endpoint and streams back decoded NDJSON lines.
#[derive(Clone)]
pub struct HttpSpeechSynthesizer {
    client: Client,
    endpoint: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(endpoint: &str) -> Result<Self, SynthesisError> {
        // Whole-clip ceiling; long narration streams for a while
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| SynthesisError::ClientSetup(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SpeechSynthesisPort for HttpSpeechSynthesizer {
    async fn stream_speech(
        &self,
        request: SynthesisRequest,
    ) -> Result<AudioChunkStream, SynthesisError> {
        tracing::debug!(
            character = %request.character,
            chars = request.text.chars().count(),
            "Requesting speech synthesis"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| SynthesisError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SynthesisError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(ndjson_chunks(Box::pin(response.bytes_stream())))
    }
}

struct BodyReader<S> {
    body: S,
    decoder: NdjsonDecoder,
    ready: VecDeque<Result<SynthesisChunk, SynthesisError>>,
    done: bool,
}

/// Turn a raw byte stream into synthesis chunks, one per NDJSON line.
///
/// A transport error ends the stream after yielding `SynthesisError::Stream`.
pub fn ndjson_chunks<S, B, E>(body: S) -> AudioChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let reader = BodyReader {
        body,
        decoder: NdjsonDecoder::new(),
        ready: VecDeque::new(),
        done: false,
    };

    stream::unfold(reader, |mut reader| async move {
        loop {
            if let Some(item) = reader.ready.pop_front() {
                return Some((item, reader));
            }
            if reader.done {
                return None;
            }
            match reader.body.next().await {
                Some(Ok(bytes)) => {
                    let chunks = reader.decoder.push(bytes.as_ref());
                    reader.ready.extend(chunks);
                }
                Some(Err(e)) => {
                    reader.done = true;
                    reader
                        .ready
                        .push_back(Err(SynthesisError::Stream(e.to_string())));
                }
                None => {
                    reader.done = true;
                    if let Some(last) = reader.decoder.finish() {
                        reader.ready.push_back(last);
                    }
                }
            }
        }
    })
    .boxed()
}
