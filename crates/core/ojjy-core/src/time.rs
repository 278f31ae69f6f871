//! Monotonic time and bounded busy-waits.
//!
//! The hardware timer lives outside this core; it is consumed only through
//! [`ClockSource`]. Device waits poll a condition until a [`Timeout`] expires.
//! Expiry is best effort: the clock is sampled between polls, and a spin
//! ceiling ends the wait even if the clock never advances (for example before
//! the timer has been calibrated).

use core::sync::atomic::{AtomicU64, Ordering};

/// Nanoseconds per scheduler tick (1 tick = 1 ms).
pub const NANOS_PER_TICK: u64 = 1_000_000;

/// A monotonic clock that reports nanoseconds since an arbitrary epoch.
pub trait ClockSource: Send + Sync {
    /// Current time in nanoseconds.
    fn read_nanos(&self) -> u64;

    /// Current time in ticks.
    fn ticks(&self) -> u64 {
        self.read_nanos() / NANOS_PER_TICK
    }
}

/// Upper bound on a busy-wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout {
    nanos: u64,
    max_spins: u64,
}

impl Timeout {
    /// Spin ceiling used by [`Timeout::from_nanos`] and [`Timeout::from_millis`].
    pub const DEFAULT_SPIN_LIMIT: u64 = 100_000;

    /// A timeout of `nanos` nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Self {
            nanos,
            max_spins: Self::DEFAULT_SPIN_LIMIT,
        }
    }

    /// A timeout of `ms` milliseconds.
    pub const fn from_millis(ms: u64) -> Self {
        Self::from_nanos(ms.saturating_mul(NANOS_PER_TICK))
    }

    /// Replaces the spin ceiling.
    #[must_use]
    pub const fn with_spin_limit(mut self, max_spins: u64) -> Self {
        self.max_spins = max_spins;
        self
    }

    /// Length of the timeout in nanoseconds.
    pub const fn as_nanos(self) -> u64 {
        self.nanos
    }

    /// Maximum number of polls before giving up.
    pub const fn spin_limit(self) -> u64 {
        self.max_spins
    }
}

/// Returned by [`spin_until`] when the condition never became true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimedOut;

/// Polls `ready` until it returns `true` or `timeout` runs out.
///
/// # Errors
///
/// [`TimedOut`] if the deadline passed or the spin ceiling was reached first.
pub fn spin_until(
    clock: &dyn ClockSource,
    timeout: Timeout,
    mut ready: impl FnMut() -> bool,
) -> Result<(), TimedOut> {
    let deadline = clock.read_nanos().saturating_add(timeout.nanos);
    let mut spins = 0u64;
    loop {
        if ready() {
            return Ok(());
        }
        spins += 1;
        if spins >= timeout.max_spins || clock.read_nanos() >= deadline {
            return Err(TimedOut);
        }
        core::hint::spin_loop();
    }
}

/// A software clock advanced by hand, optionally by a fixed step on every read.
///
/// Stands in for the hardware timer on hosts and in early boot.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
    step: u64,
}

impl ManualClock {
    /// A clock frozen at zero.
    pub const fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
            step: 0,
        }
    }

    /// A clock that moves forward by `step` nanoseconds each time it is read.
    pub const fn with_step(step: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            step,
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Ordering::Relaxed);
    }

    /// Moves the clock forward by whole ticks.
    pub fn advance_ticks(&self, ticks: u64) {
        self.advance(ticks.saturating_mul(NANOS_PER_TICK));
    }
}

impl ClockSource for ManualClock {
    fn read_nanos(&self) -> u64 {
        self.now.fetch_add(self.step, Ordering::Relaxed)
    }
}
