//! Streaming speech synthesis adapter.

mod http_client;
mod ndjson;

pub use http_client::{ndjson_chunks, HttpSpeechSynthesizer, DEFAULT_SYNTHESIS_URL};
pub use ndjson::NdjsonDecoder;
