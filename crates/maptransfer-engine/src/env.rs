//! Abstraction over time and randomness so the state machines in this
//! crate can be driven by either real system time or a deterministic test
//! clock.
//!
//! # Invariants
//!
//! - `now()` is monotonically non-decreasing for a given `Environment`
//!   instance.
//! - `random_bytes()` fills the entire buffer; in production it must be
//!   cryptographically secure (session ids, nonces), in tests it may be
//!   deterministic given a seed.

use std::future::Future;
use std::time::Duration;

/// Decouples [`crate::auth::AuthEngine`] and
/// [`crate::session::TransferSession`] from `std::time::Instant` and OS
/// randomness so both state machines stay deterministic and testable.
pub trait Environment: Clone + Send + Sync + 'static {
    /// An opaque, monotonically increasing instant.
    type Instant: Copy + Ord + std::fmt::Debug + Send + Sync;

    /// The current instant.
    fn now(&self) -> Self::Instant;

    /// Duration elapsed between two instants produced by this environment.
    fn elapsed(&self, earlier: Self::Instant, later: Self::Instant) -> Duration;

    /// Asynchronously sleep for `duration`.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fill `buffer` with randomness.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Unix timestamp in whole seconds, for wire fields that carry
    /// wall-clock time (`auth_challenge.timestamp`).
    fn wall_clock_secs(&self) -> u64;

    /// Convenience: a random 128-bit value, built from [`Self::random_bytes`].
    fn random_u128(&self) -> u128 {
        let mut buf = [0u8; 16];
        self.random_bytes(&mut buf);
        u128::from_be_bytes(buf)
    }
}
