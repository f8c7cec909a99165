//! Line splitting for newline-delimited JSON bodies.
//!
//! Network reads do not respect line boundaries, so partial lines are held
//! until the rest arrives.

use sleuth_shared::SynthesisChunk;

use crate::ports::outbound::SynthesisError;

#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    pending: Vec<u8>,
}

impl NdjsonDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<SynthesisChunk, SynthesisError>> {
        self.pending.extend_from_slice(bytes);

        let mut chunks = Vec::new();
        while let Some(newline) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=newline).collect();
            if let Some(chunk) = parse_line(&line) {
                chunks.push(chunk);
            }
        }
        chunks
    }

    /// Parse whatever is left once the body ends without a trailing newline.
    pub fn finish(&mut self) -> Option<Result<SynthesisChunk, SynthesisError>> {
        let rest = std::mem::take(&mut self.pending);
        parse_line(&rest)
    }
}

fn parse_line(line: &[u8]) -> Option<Result<SynthesisChunk, SynthesisError>> {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(
        serde_json::from_str::<SynthesisChunk>(text)
            .map_err(|e| SynthesisError::InvalidChunk(e.to_string())),
    )
}
