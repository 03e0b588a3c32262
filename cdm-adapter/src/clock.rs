use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock capability injected at construction, so tests can supply a
/// deterministic clock instead of the system one.
pub trait Clock: Send + Sync {
    /// Fractional seconds since the Unix epoch.
    fn wall_time(&self) -> f64;
}

/// The real system clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn wall_time(&self) -> f64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_secs_f64())
            .unwrap_or(0.0)
    }
}
