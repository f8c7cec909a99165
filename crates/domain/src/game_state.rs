//! Narrative game state as seen by a player.
//!
//! `GameState` values are never mutated in place once published: every change
//! produces a new value (see the `with_*` builders), so observers holding an
//! older snapshot keep a consistent view.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Current phase of the mystery (e.g. `intro`, `investigation`, `accusation`).
///
/// Phases are defined by the server-side script, so this stays an open string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GamePhase(String);

impl GamePhase {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for GamePhase {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One line of the narrative timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeEntry {
    pub character: String,
    pub content: String,
}

impl NarrativeEntry {
    pub fn new(character: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            character: character.into(),
            content: content.into(),
        }
    }
}

/// A clue the players have uncovered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
}

/// Authoritative player-side view of the game.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GameState {
    pub phase: GamePhase,
    /// Append-only, insertion order is significant.
    #[serde(default)]
    pub events: Vec<NarrativeEntry>,
    #[serde(default)]
    pub discovered_evidence: Vec<Evidence>,
}

impl GameState {
    pub fn new(phase: impl Into<GamePhase>) -> Self {
        Self {
            phase: phase.into(),
            events: Vec::new(),
            discovered_evidence: Vec::new(),
        }
    }

    /// Returns a copy of this state with `entry` appended to the timeline.
    pub fn with_event(&self, entry: NarrativeEntry) -> Self {
        let mut events = Vec::with_capacity(self.events.len() + 1);
        events.extend(self.events.iter().cloned());
        events.push(entry);
        Self {
            phase: self.phase.clone(),
            events,
            discovered_evidence: self.discovered_evidence.clone(),
        }
    }

    /// Returns a copy of this state whose evidence list is replaced.
    pub fn with_evidence(self, evidence: Vec<Evidence>) -> Self {
        Self {
            discovered_evidence: evidence,
            ..self
        }
    }

    pub fn last_event(&self) -> Option<&NarrativeEntry> {
        self.events.last()
    }
}
