//! Sleuth Domain - value types shared by the player runtime.
//!
//! Pure data and invariants only: no I/O, no async, no logging.

pub mod error;
pub mod game_state;
pub mod ids;
pub mod narration;

pub use error::DomainError;
pub use game_state::{Evidence, GamePhase, GameState, NarrativeEntry};
pub use ids::{ScriptId, SessionId};
pub use narration::{
    truncate_narration, NarrationItem, PlaybackHandle, DEFAULT_MAX_NARRATION_CHARS,
    ELLIPSIS_MARKER,
};
