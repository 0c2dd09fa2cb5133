//! Wall-clock source for scheduling decisions.

use chrono::{DateTime, Local};

/// Supplies "now" in local time. Injected so tests can run on virtual time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}
