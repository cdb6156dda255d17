use std::time::{Duration, Instant};

/// Counts events and reports their rate once per interval.
pub struct RateCounter {
    count: u32,
    last_time: Instant,
    interval: Duration,
}

impl RateCounter {
    /// Create a new counter reporting every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            count: 0,
            last_time: Instant::now(),
            interval,
        }
    }

    /// Record one event.
    /// Returns Some(events per second) if the reporting interval has passed, otherwise None.
    pub fn tick(&mut self) -> Option<f32> {
        self.count += 1;
        self.poll()
    }

    /// Like [`tick`](Self::tick) without recording an event.
    pub fn poll(&mut self) -> Option<f32> {
        let elapsed = self.last_time.elapsed();
        if elapsed >= self.interval {
            let rate = self.count as f32 / elapsed.as_secs_f32();
            self.count = 0;
            self.last_time = Instant::now();
            Some(rate)
        } else {
            None
        }
    }
}

impl Default for RateCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}
