//! FIFO of pending utterances plus the "currently speaking" handle.
//!
//! Plain data structure; the worker decides when to start and finish clips.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

use sleuth_domain::{NarrationItem, PlaybackHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    Disabled,
    Blank,
    Duplicate,
}

#[derive(Debug)]
pub struct NarrationQueue {
    items: VecDeque<NarrationItem>,
    playing: Option<PlaybackHandle>,
    enabled: bool,
    max_chars: usize,
}

impl NarrationQueue {
    pub fn new(enabled: bool, max_chars: usize) -> Self {
        Self {
            items: VecDeque::new(),
            playing: None,
            enabled,
            max_chars,
        }
    }

    pub fn enqueue(
        &mut self,
        character: &str,
        text: &str,
        voice_id: Option<String>,
    ) -> EnqueueOutcome {
        if !self.enabled {
            return EnqueueOutcome::Disabled;
        }
        let Ok(item) = NarrationItem::new(character, text, voice_id, self.max_chars) else {
            return EnqueueOutcome::Blank;
        };
        if self.items.iter().any(|queued| queued.same_utterance(&item)) {
            return EnqueueOutcome::Duplicate;
        }
        self.items.push_back(item);
        EnqueueOutcome::Queued
    }

    /// Pop the head and mark it playing. `None` while something is already playing.
    pub fn start_next(&mut self, now: DateTime<Utc>) -> Option<NarrationItem> {
        if self.playing.is_some() {
            return None;
        }
        let item = self.items.pop_front()?;
        self.playing = Some(PlaybackHandle::for_item(&item, now));
        Some(item)
    }

    pub fn finish(&mut self) {
        self.playing = None;
    }

    /// Drop everything pending and forget the playing clip.
    pub fn clear(&mut self) {
        self.items.clear();
        self.playing = None;
    }

    /// Disabling also clears.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
        if !enabled {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn playing(&self) -> Option<&PlaybackHandle> {
        self.playing.as_ref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use sleuth_domain::{DEFAULT_MAX_NARRATION_CHARS, ELLIPSIS_MARKER};

    use super::*;

    fn queue() -> NarrationQueue {
        NarrationQueue::new(true, DEFAULT_MAX_NARRATION_CHARS)
    }

    #[test]
    fn duplicate_of_queued_item_is_dropped() {
        let mut queue = queue();

        assert_eq!(queue.enqueue("Maid", "A scream!", None), EnqueueOutcome::Queued);
        assert_eq!(
            queue.enqueue("Maid", "A scream!", Some("v2".into())),
            EnqueueOutcome::Duplicate
        );
        assert_eq!(queue.enqueue("Butler", "A scream!", None), EnqueueOutcome::Queued);
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn same_text_may_return_once_it_has_left_the_queue() {
        let mut queue = queue();
        queue.enqueue("Maid", "Again?", None);
        queue.start_next(Utc::now());

        assert_eq!(queue.enqueue("Maid", "Again?", None), EnqueueOutcome::Queued);
    }

    #[test]
    fn blank_and_disabled_are_ignored() {
        let mut queue = queue();
        assert_eq!(queue.enqueue("Maid", "   \n", None), EnqueueOutcome::Blank);

        queue.set_enabled(false);
        assert_eq!(queue.enqueue("Maid", "Hello", None), EnqueueOutcome::Disabled);
        assert!(queue.is_empty());
    }

    #[test]
    fn long_text_is_capped() {
        let mut queue = queue();
        queue.enqueue("Narrator", &"x".repeat(600), None);

        let item = queue.start_next(Utc::now()).expect("item");
        assert_eq!(item.text.chars().count(), 500 + ELLIPSIS_MARKER.len());
        assert!(item.text.ends_with(ELLIPSIS_MARKER));
    }

    #[test]
    fn only_one_item_plays_at_a_time() {
        let mut queue = queue();
        queue.enqueue("A", "first", None);
        queue.enqueue("B", "second", None);

        let first = queue.start_next(Utc::now()).expect("first");
        assert_eq!(first.character, "A");
        assert!(queue.start_next(Utc::now()).is_none());
        assert_eq!(queue.playing().map(|h| h.character.as_str()), Some("A"));

        queue.finish();
        let second = queue.start_next(Utc::now()).expect("second");
        assert_eq!(second.character, "B");
    }

    #[test]
    fn disabling_clears_queue_and_handle() {
        let mut queue = queue();
        queue.enqueue("A", "first", None);
        queue.enqueue("B", "second", None);
        queue.start_next(Utc::now());

        queue.set_enabled(false);

        assert!(queue.is_empty());
        assert!(queue.playing().is_none());
        assert!(!queue.is_enabled());
    }
}
