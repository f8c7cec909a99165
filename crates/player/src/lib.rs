//! Sleuth Player - realtime client runtime for the mystery game.
//!
//! Keeps one game session in sync with the server over a WebSocket, reduces
//! inbound messages into a [`GameState`](sleuth_domain::GameState), and speaks
//! character lines through a streaming speech synthesizer.
//!
//! - `ports`: traits for the socket, synthesizer, audio output, clock and entropy
//! - `infrastructure`: tokio-tungstenite, reqwest, audio and messaging adapters
//! - `state`: the pure narrative state reducer
//! - `application`: the session coordinator and narration worker
//! - `config`: environment configuration

pub mod application;
pub mod config;
pub mod infrastructure;
pub mod ports;
pub mod state;

pub use application::{SessionConfig, SessionCoordinator, SessionDependencies, SessionError};
pub use config::{AudioOutputKind, PlayerConfig};
pub use infrastructure::{ConnectionState, EventBus, SessionEvent};
