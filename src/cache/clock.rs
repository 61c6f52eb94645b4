//! Time source for cache expiry

use std::sync::atomic::{AtomicI64, Ordering};

/// Supplies the current time in whole Unix seconds
pub trait Clock: Send + Sync {
    fn now_secs(&self) -> i64;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Hand-driven clock for tests and simulations
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(start_secs),
        }
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn set(&self, secs: i64) {
        self.now.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        clock.advance(59);
        assert_eq!(clock.now_secs(), 1_059);
        clock.set(5);
        assert_eq!(clock.now_secs(), 5);
    }
}
