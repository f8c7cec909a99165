//! WebSocket client for the game server
//!
//! - `desktop`: tokio-tungstenite based socket connector
//! - `transport`: the session transport actor (fencing, reconnect, tagging)
//! - `core`: runtime-free reconnect backoff math

mod core;
mod desktop;
mod shared;
mod socket_url;
pub mod transport;

pub use self::core::{BackoffState, ReconnectPolicy};
pub use desktop::TungsteniteConnector;
pub use shared::{DEFAULT_RECONNECT_DELAY_MS, EVENT_BUFFER};
pub use socket_url::build_socket_url;
pub use transport::{SendError, SessionTransport, TransportConfig, TransportEvent};
