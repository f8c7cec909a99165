//! Sleuth Protocol - wire types shared between the game server and the player
//!
//! This crate contains:
//! - Game socket frames (inbound `ServerMessage` envelopes, outbound `ClientMessage`)
//! - Streaming speech synthesis request/chunk DTOs
//!
//! # Design Principles
//!
//! 1. **Minimal dependencies** - Only serde, serde_json, and thiserror
//! 2. **No business logic** - Pure data types and serialization

pub mod error;
pub mod messages;
pub mod synthesis;

pub use error::ProtocolError;
pub use messages::{
    ClientMessage, InboundEnvelope, NarrativeEventData, OutboundPayload, ServerFrame,
    ServerMessage,
};
pub use synthesis::{SynthesisChunk, SynthesisRequest, SYNTHESIS_SAMPLE_RATE};
