//! Outbound ports - Interfaces for external services
//!
//! These ports define the contracts that infrastructure adapters must implement,
//! allowing application services to interact with the socket, the speech
//! synthesizer, and the audio device without depending on concrete implementations.

pub mod audio_output_port;
pub mod platform;
pub mod socket_port;
pub mod synthesis_port;

pub use audio_output_port::{AudioError, AudioOutputFactory, AudioOutputPort};
pub use platform::{RandomProvider, SystemRandom, SystemTime, TimeProvider};
pub use socket_port::{SocketConnection, SocketConnector, SocketEvent, TransportError};
pub use synthesis_port::{AudioChunkStream, SpeechSynthesisPort, SynthesisError};
