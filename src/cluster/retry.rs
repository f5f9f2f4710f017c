//! Connection retry spacing.

/// Target spacing between connection attempts in milliseconds.
pub const CONNECTION_RETRY_TIMEOUT_MS: u64 = 30_000;

/// Delay before the next connection attempt, given how long the failed
/// attempt itself took.
///
/// A slow failure (e.g. a 25 s network timeout) eats into the spacing; the
/// delay never drops below 1 ms so the loop always yields.
pub fn connection_retry_delay_ms(elapsed_ms: u64) -> u64 {
    CONNECTION_RETRY_TIMEOUT_MS.saturating_sub(elapsed_ms).max(1)
}
