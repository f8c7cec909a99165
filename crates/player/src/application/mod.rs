//! Application layer: session orchestration and narration.

pub mod narration;
pub mod session_coordinator;

pub use session_coordinator::{
    SessionConfig, SessionCoordinator, SessionDependencies, SessionError, GAME_ENDED_SPEAKER,
};
