pub mod audio;
pub mod messaging;
pub mod synthesis;
pub mod websocket;

// Re-export messaging types
pub use messaging::{ConnectionState, ConnectionStateObserver, EventBus, SessionEvent};
