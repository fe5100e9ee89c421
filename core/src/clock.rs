use std::time::Instant;

use chrono::{DateTime, Utc};

/// Time source for deposit timestamps and invocation timing.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn instant(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
