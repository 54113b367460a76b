use chrono::{Local, NaiveDateTime};

/// Time source for the store and reminder engine. Injected so tests can
/// pin "now" to a fixed instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Wall clock in local time. Reminder triggers are calendar times on the
/// user's device, so local time is the right frame here.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}
