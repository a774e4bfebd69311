//! Time source used to measure request latency.

use std::time::{Duration, Instant};

/// Something that can tell the time and measure against it.
///
/// [`SystemClock`] is the real one; tests plug in a clock with scripted
/// readings through [`LoggingMiddleware::with_clock`](super::LoggingMiddleware::with_clock).
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn since(&self, start: Instant) -> Duration;
}

/// The monotonic system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn since(&self, start: Instant) -> Duration {
        start.elapsed()
    }
}
