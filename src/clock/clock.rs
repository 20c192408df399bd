use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Time source used by timeout scheduling.
///
/// Production code uses [`Clock::system`]. Tests use [`Clock::manual`] and
/// advance time explicitly, so timeout and staleness behavior is fully
/// reproducible.
///
/// # Examples
///
/// ```
/// use apiary::clock::Clock;
/// use std::time::Duration;
///
/// let (clock, handle) = Clock::manual();
/// let before = clock.now();
/// handle.advance(Duration::from_millis(100));
/// assert_eq!(clock.now() - before, Duration::from_millis(100));
/// ```
#[derive(Clone)]
pub struct Clock {
    source: TimeSource,
}

#[derive(Clone)]
enum TimeSource {
    System,
    Manual(ManualClock),
}

impl Clock {
    /// Wall-clock time.
    pub fn system() -> Self {
        Self {
            source: TimeSource::System,
        }
    }

    /// A manually-advanceable clock plus the handle that drives it.
    pub fn manual() -> (Self, ManualClock) {
        let manual = ManualClock::new();
        (
            Self {
                source: TimeSource::Manual(manual.clone()),
            },
            manual,
        )
    }

    /// Current time according to this source.
    pub fn now(&self) -> Instant {
        match &self.source {
            TimeSource::System => Instant::now(),
            TimeSource::Manual(manual) => manual.now(),
        }
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

/// Handle for advancing a manual [`Clock`].
///
/// All clones share the same offset, so every clock built from the same
/// handle sees the same time.
#[derive(Clone)]
pub struct ManualClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl ManualClock {
    fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Current manual time.
    pub fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_us.load(Ordering::Acquire));
        self.epoch + offset
    }
}
