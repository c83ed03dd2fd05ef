//! Clock abstraction for the chain timeout budget.
//!
//! The blocking deliverer measures elapsed wall-clock time across a whole
//! handler chain. Injecting the clock keeps that budget deterministic under
//! test: production uses `RealClock`, tests advance a `TestClock` manually.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Clock abstraction for time operations.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Returns the current instant for duration measurements.
    fn now(&self) -> Instant;

    /// Returns the current system time for event timestamps.
    fn now_system(&self) -> SystemTime;
}

/// Production clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock instance.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Test clock with manually controlled time progression.
///
/// Monotonic and system time advance together, so budget-exhaustion paths
/// run instantly in tests.
#[derive(Debug, Clone)]
pub struct TestClock {
    elapsed_ns: Arc<AtomicU64>,
    base_instant: Instant,
    base_system_ns: u64,
}

impl TestClock {
    /// Creates a new test clock starting at the current time.
    pub fn new() -> Self {
        let since_epoch =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();

        Self {
            elapsed_ns: Arc::new(AtomicU64::new(0)),
            base_instant: Instant::now(),
            base_system_ns: u64::try_from(since_epoch.as_nanos().min(u128::from(u64::MAX)))
                .unwrap_or(0),
        }
    }

    /// Advances the clock by the specified duration.
    pub fn advance(&self, duration: Duration) {
        let duration_ns =
            u64::try_from(duration.as_nanos().min(u128::from(u64::MAX))).unwrap_or(0);
        self.elapsed_ns.fetch_add(duration_ns, Ordering::AcqRel);
    }

    /// Returns elapsed time since clock creation.
    pub fn elapsed(&self) -> Duration {
        Duration::from_nanos(self.elapsed_ns.load(Ordering::Acquire))
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base_instant + self.elapsed()
    }

    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.base_system_ns) + self.elapsed()
    }
}
