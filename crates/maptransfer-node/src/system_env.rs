//! Production [`Environment`] implementation using system time and OS RNG.
//!
//! # Capabilities
//!
//! - Real system time (`std::time::Instant`) that advances naturally.
//! - OS cryptographic RNG (`getrandom`). Truly random, not reproducible.
//! - Tokio async sleep for actual wall-clock delays.
//!
//! This means production behavior is non-deterministic, but provides
//! real-world timing and security-grade randomness for session ids,
//! nonces, and the auth handshake.

use std::time::Duration;

use maptransfer_engine::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Panics
///
/// [`Environment::random_bytes`] panics if the OS RNG fails. This is
/// intentional — a node without functioning cryptographic randomness
/// cannot authenticate a terminal securely, and continuing would
/// compromise session ids, nonces, and the whole handshake.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn elapsed(&self, earlier: Self::Instant, later: Self::Instant) -> Duration {
        later.saturating_duration_since(earlier)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer)
            .expect("invariant: OS RNG failure is unrecoverable - node cannot authenticate securely");
    }

    #[allow(clippy::disallowed_methods)]
    #[allow(clippy::expect_used)]
    fn wall_clock_secs(&self) -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("invariant: system clock is after Unix epoch (1970-01-01)")
            .as_secs()
    }
}
