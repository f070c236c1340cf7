/// Abstraction over "now", so the staleness and cache-freshness tests can
/// inject a fake clock instead of racing real wall time.
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> f64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> f64 {
        chrono::Utc::now().timestamp_millis() as f64 / 1000.0
    }
}

/// Callback invoked when a watched file is modified or deleted, so the
/// working-memory cache can drop its entry for that path (§4.8).
pub type InvalidationCallback = Box<dyn Fn(&str) + Send + Sync>;
