//! Narration value types: queued utterances and the "currently speaking" marker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Default cap on narrated text, in characters.
pub const DEFAULT_MAX_NARRATION_CHARS: usize = 500;

/// Appended to text cut at the narration cap.
pub const ELLIPSIS_MARKER: &str = "...";

/// Cuts `text` to at most `max_chars` characters, marking the cut with an ellipsis.
///
/// Counts Unicode scalar values, never splitting a character.
pub fn truncate_narration(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + ELLIPSIS_MARKER.len());
            cut.push_str(&text[..byte_idx]);
            cut.push_str(ELLIPSIS_MARKER);
            cut
        }
        None => text.to_string(),
    }
}

/// A single character utterance waiting for synthesis and playback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrationItem {
    pub character: String,
    pub text: String,
    /// Optional voice hint forwarded to the synthesizer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
}

impl NarrationItem {
    /// Builds an item, trimming surrounding whitespace and enforcing the length cap.
    pub fn new(
        character: impl Into<String>,
        text: &str,
        voice_id: Option<String>,
        max_chars: usize,
    ) -> Result<Self, DomainError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("Narration text cannot be empty"));
        }

        Ok(Self {
            character: character.into(),
            text: truncate_narration(trimmed, max_chars),
            voice_id,
        })
    }

    /// Two items are the same utterance when speaker and text match; the voice
    /// hint does not participate.
    pub fn same_utterance(&self, other: &NarrationItem) -> bool {
        self.character == other.character && self.text == other.text
    }
}

/// Marker for the clip currently sounding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackHandle {
    pub character: String,
    pub text: String,
    pub started_at: DateTime<Utc>,
}

impl PlaybackHandle {
    pub fn for_item(item: &NarrationItem, started_at: DateTime<Utc>) -> Self {
        Self {
            character: item.character.clone(),
            text: item.text.clone(),
            started_at,
        }
    }
}
