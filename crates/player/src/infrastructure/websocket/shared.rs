//! Shared constants for the game socket client.

// Reconnection constants
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
pub const MAX_RETRY_DELAY_MS: u64 = 30_000;
pub const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Capacity of the per-socket outgoing frame buffer.
pub const OUTGOING_BUFFER: usize = 32;

/// Capacity of the transport → coordinator event channel.
pub const EVENT_BUFFER: usize = 256;
