//! Narration: queued character lines turned into streamed speech.

mod queue;
#[cfg(test)]
pub(crate) mod testing;
mod worker;

pub use queue::{EnqueueOutcome, NarrationQueue};
pub use worker::{NarrationConfig, NarrationService, DEFAULT_DRAIN_INTERVAL_MS};
