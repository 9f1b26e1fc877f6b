use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Ticks per second of [`SessionClock`]; one tick is one nanosecond.
pub const CLOCK_FREQUENCY: u64 = 1_000_000_000;

/// Monotonic timestamp source of a session.
///
/// Event timestamps are raw ticks counted from the moment the session was
/// created, which keeps the producer path to a single monotonic clock read.
/// The clock remembers the wall-clock time of its origin; the consumer writes
/// that anchor to the stream as a [`ClockSync`] so readers can turn ticks
/// back into [`SystemTime`].
///
/// # Examples
///
/// ```
/// # use binlog::clock::SessionClock;
/// let clock = SessionClock::new();
/// let first = clock.now();
/// let second = clock.now();
/// assert!(second >= first);
///
/// let sync = clock.sync();
/// assert_eq!(sync.clock_value, 0);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct SessionClock {
    origin: Instant,
    origin_ns_since_epoch: u64,
}

impl SessionClock {
    pub fn new() -> Self {
        let origin = Instant::now();
        let origin_ns_since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            origin,
            origin_ns_since_epoch,
        }
    }

    /// Ticks elapsed since the clock was created.
    #[inline(always)]
    pub fn now(&self) -> u64 {
        self.origin.elapsed().as_nanos() as u64
    }

    /// The anchor tying tick 0 to wall-clock time.
    pub fn sync(&self) -> ClockSync {
        ClockSync {
            clock_value: 0,
            clock_frequency: CLOCK_FREQUENCY,
            ns_since_epoch: self.origin_ns_since_epoch,
        }
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Pairs a clock reading with the wall-clock time it was taken at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSync {
    pub clock_value: u64,
    /// Ticks per second.
    pub clock_frequency: u64,
    pub ns_since_epoch: u64,
}

impl ClockSync {
    /// Converts a tick count taken on the synchronized clock to wall-clock
    /// time. Ticks before the sync point are clamped to it.
    pub fn to_system_time(&self, ticks: u64) -> SystemTime {
        let delta = ticks.saturating_sub(self.clock_value) as u128;
        let frequency = self.clock_frequency.max(1) as u128;
        let delta_ns = delta * 1_000_000_000 / frequency;
        UNIX_EPOCH + Duration::from_nanos(self.ns_since_epoch) + Duration::from_nanos(delta_ns as u64)
    }
}
