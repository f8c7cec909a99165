//! Platform abstraction ports
//!
//! Clock and entropy are injected so session id generation and playback
//! timestamps stay deterministic under test.

use chrono::{DateTime, Utc};

/// Time operations abstraction
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TimeProvider: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Random number generation abstraction
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait RandomProvider: Send + Sync {
    fn random_u64(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTime;

impl TimeProvider for SystemTime {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRandom;

impl RandomProvider for SystemRandom {
    fn random_u64(&self) -> u64 {
        use rand::Rng;
        rand::thread_rng().gen()
    }
}
