//! Session messaging infrastructure.
//!
//! - `ConnectionStateObserver`: lock-free view of the transport state
//! - `EventBus`: push-based session event subscription for UI layers

pub mod connection;
pub mod event_bus;

pub use connection::{set_connection_state, ConnectionState, ConnectionStateObserver};
pub use event_bus::{EventBus, SessionEvent};
