use chrono::{DateTime, Utc};

/// Source of "now" for the scheduler. The engine never sleeps on its own
/// clock, it only reads it once per tick or command.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-util"))]
pub use manual::ManualClock;

#[cfg(any(test, feature = "test-util"))]
mod manual {
    use std::sync::{Arc, Mutex, PoisonError};

    use chrono::{DateTime, TimeDelta, Utc};

    use super::Clock;

    /// Synthetic clock for tests. Clones share the same instant.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        now: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        pub fn new(start: DateTime<Utc>) -> Self {
            Self {
                now: Arc::new(Mutex::new(start)),
            }
        }

        pub fn set(&self, now: DateTime<Utc>) {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
        }

        pub fn advance(&self, delta: TimeDelta) {
            let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
            *now += delta;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.now.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }
}
