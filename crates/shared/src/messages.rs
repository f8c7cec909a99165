//! WebSocket message types for the game socket
//!
//! Inbound frames are loosely shaped JSON objects:
//! `{ "type": "...", "data": { ... }, "message": "...", "session_id": "..." }`.
//! They are first read into a [`ServerFrame`] and then lifted into a typed
//! [`InboundEnvelope`]. The fencing token may live either at the top level or
//! inside `data`; `data.session_id` wins when both are present.
//!
//! Outbound frames are the caller's JSON object with `session_id` injected.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use sleuth_domain::{Evidence, GameState, ScriptId, SessionId};

use crate::error::ProtocolError;

const DEFAULT_SERVER_ERROR: &str = "Unknown server error";

// =============================================================================
// Server Messages (Server → Player)
// =============================================================================

/// Raw inbound frame before type dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerFrame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Payload of a character speaking or acting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeEventData {
    pub character: String,
    /// Spoken line or described action. Older servers send it as `action`.
    #[serde(alias = "action", default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Full replacement evidence list, when the event reveals something new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_evidence: Option<Vec<Evidence>>,
}

/// Typed inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Full state replacement
    GameStateSnapshot(GameState),
    /// A character said or did something
    NarrativeEvent(NarrativeEventData),
    /// Server moved the game to a new phase; carries the resulting state
    PhaseChanged { new_state: GameState },
    /// Terminal notification, optionally with closing narration
    GameEnded { message: String },
    /// Server wiped the game
    GameReset,
    /// Server-side failure report
    Error { message: String },
}

impl ServerMessage {
    /// Wire name of the message kind, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::GameStateSnapshot(_) => "game_state",
            ServerMessage::NarrativeEvent(_) => "ai_action",
            ServerMessage::PhaseChanged { .. } => "phase_changed",
            ServerMessage::GameEnded { .. } => "game_ended",
            ServerMessage::GameReset => "game_reset",
            ServerMessage::Error { .. } => "error",
        }
    }
}

/// One decoded inbound frame plus its fencing token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    pub session_id: Option<SessionId>,
    pub message: ServerMessage,
}

impl InboundEnvelope {
    pub fn new(session_id: Option<SessionId>, message: ServerMessage) -> Self {
        Self {
            session_id,
            message,
        }
    }

    /// Parse a text frame received from the socket.
    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        let frame: ServerFrame = serde_json::from_str(text)?;
        Self::from_frame(frame)
    }

    pub fn from_frame(frame: ServerFrame) -> Result<Self, ProtocolError> {
        let session_id = frame
            .data
            .as_ref()
            .and_then(|data| data.get("session_id"))
            .and_then(Value::as_str)
            .map(SessionId::from)
            .or_else(|| frame.session_id.clone().map(SessionId::from));

        let message = match frame.kind.as_str() {
            "game_state" => {
                let data = require_data(&frame)?;
                ServerMessage::GameStateSnapshot(from_data(&frame.kind, data)?)
            }
            "ai_action" | "narrative_event" => {
                let data = require_data(&frame)?;
                ServerMessage::NarrativeEvent(from_data(&frame.kind, data)?)
            }
            "phase_changed" => {
                let data = require_data(&frame)?;
                let snapshot = data.get("new_state").cloned().unwrap_or_else(|| data.clone());
                ServerMessage::PhaseChanged {
                    new_state: from_data(&frame.kind, snapshot)?,
                }
            }
            "game_ended" => ServerMessage::GameEnded {
                message: frame_message(&frame).unwrap_or_default(),
            },
            "game_reset" => ServerMessage::GameReset,
            "error" => ServerMessage::Error {
                message: frame_message(&frame)
                    .unwrap_or_else(|| DEFAULT_SERVER_ERROR.to_string()),
            },
            other => return Err(ProtocolError::UnknownType(other.to_string())),
        };

        Ok(Self {
            session_id,
            message,
        })
    }
}

fn require_data(frame: &ServerFrame) -> Result<Value, ProtocolError> {
    frame
        .data
        .clone()
        .ok_or_else(|| ProtocolError::MissingField {
            kind: frame.kind.clone(),
            field: "data",
        })
}

fn from_data<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T, ProtocolError> {
    serde_json::from_value(data).map_err(|e| ProtocolError::InvalidPayload {
        kind: kind.to_string(),
        reason: e.to_string(),
    })
}

/// Top-level `message` first, then `data.message`.
fn frame_message(frame: &ServerFrame) -> Option<String> {
    frame.message.clone().or_else(|| {
        frame
            .data
            .as_ref()
            .and_then(|data| data.get("message"))
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

// =============================================================================
// Client Messages (Player → Server)
// =============================================================================

/// Control messages the player sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Begin the given script in the current session
    StartGame { script_id: ScriptId },
    /// Ask the narrator to advance to the next phase
    NextPhase,
    /// Wipe the current game
    ResetGame,
}

impl ClientMessage {
    pub fn to_payload(&self) -> Result<Map<String, Value>, ProtocolError> {
        match serde_json::to_value(self)? {
            Value::Object(map) => Ok(map),
            _ => Err(ProtocolError::NotAnObject),
        }
    }
}

/// Outbound JSON object ready to be tagged with the session id.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundPayload(Map<String, Value>);

impl OutboundPayload {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Accepts any JSON object; other JSON values are rejected.
    pub fn from_value(value: Value) -> Result<Self, ProtocolError> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            _ => Err(ProtocolError::NotAnObject),
        }
    }

    /// Serialize with `session_id` injected, replacing any caller-supplied value.
    pub fn encode(mut self, session_id: &SessionId) -> Result<String, ProtocolError> {
        self.0.insert(
            "session_id".to_string(),
            Value::String(session_id.as_str().to_string()),
        );
        Ok(serde_json::to_string(&Value::Object(self.0))?)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }
}

impl TryFrom<ClientMessage> for OutboundPayload {
    type Error = ProtocolError;

    fn try_from(message: ClientMessage) -> Result<Self, Self::Error> {
        message.to_payload().map(Self)
    }
}
