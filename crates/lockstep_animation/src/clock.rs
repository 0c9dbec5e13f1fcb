//! Time sources
//!
//! The animator never reads the system time directly. It asks a [`Clock`]
//! for "now" as a [`Duration`] since an arbitrary epoch, which lets hosts
//! plug in a monotonic wall clock or a fully deterministic one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// A monotonic time source
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's epoch
    fn now(&self) -> Duration;
}

/// Monotonic clock backed by [`Instant`], with its epoch at construction
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// A clock that only moves when told to
///
/// Stored as nanoseconds in an atomic so it can be shared with a
/// [`FrameThread`](crate::FrameThread) and advanced from a test thread.
#[derive(Debug, Default)]
pub struct ManualClock {
    nanos: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a clock already positioned at `now`
    pub fn starting_at(now: Duration) -> Self {
        let clock = Self::new();
        clock.set(now);
        clock
    }

    /// Move the clock forward by `delta`
    pub fn advance(&self, delta: Duration) {
        self.nanos
            .fetch_add(duration_to_nanos(delta), Ordering::AcqRel);
    }

    /// Jump the clock to an absolute position
    ///
    /// Setting the clock backwards is allowed; the animator saturates
    /// negative elapsed time to zero.
    pub fn set(&self, now: Duration) {
        self.nanos.store(duration_to_nanos(now), Ordering::Release);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::Acquire))
    }
}

fn duration_to_nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
