//! Narrative state reducer
//!
//! Pure: takes the current snapshot and one inbound message, returns the next
//! snapshot. States are shared behind `Arc` and never mutated, so "did it
//! change" is a pointer comparison for observers.

use std::sync::Arc;

use sleuth_domain::{GameState, NarrativeEntry};
use sleuth_shared::ServerMessage;

/// What an apply did to the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// Wholesale replacement from a snapshot or phase change
    Replaced,
    /// One event appended to the timeline
    Appended,
    /// Game reset; no state
    Cleared,
    /// Narrative event arrived with no snapshot to append to; ignored
    EventBeforeSnapshot,
    Unchanged,
}

#[derive(Debug, Clone)]
pub struct Reduction {
    pub state: Option<Arc<GameState>>,
    pub change: Change,
}

impl Reduction {
    fn keep(state: Option<&Arc<GameState>>, change: Change) -> Self {
        Self {
            state: state.cloned(),
            change,
        }
    }

    pub fn is_changed(&self) -> bool {
        matches!(
            self.change,
            Change::Replaced | Change::Appended | Change::Cleared
        )
    }
}

pub fn apply(state: Option<&Arc<GameState>>, message: &ServerMessage) -> Reduction {
    match message {
        ServerMessage::GameStateSnapshot(snapshot) => Reduction {
            state: Some(Arc::new(snapshot.clone())),
            change: Change::Replaced,
        },
        ServerMessage::PhaseChanged { new_state } => Reduction {
            state: Some(Arc::new(new_state.clone())),
            change: Change::Replaced,
        },
        ServerMessage::NarrativeEvent(event) => {
            let Some(current) = state else {
                return Reduction::keep(None, Change::EventBeforeSnapshot);
            };
            let mut next =
                current.with_event(NarrativeEntry::new(&event.character, &event.content));
            if let Some(evidence) = &event.discovered_evidence {
                next = next.with_evidence(evidence.clone());
            }
            Reduction {
                state: Some(Arc::new(next)),
                change: Change::Appended,
            }
        }
        ServerMessage::GameReset => Reduction {
            state: None,
            change: Change::Cleared,
        },
        ServerMessage::GameEnded { .. } | ServerMessage::Error { .. } => {
            Reduction::keep(state, Change::Unchanged)
        }
    }
}
