//! Wall-clock source

use std::time::SystemTime;

/// Source of wall-clock time for genesis and round computations
pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;
}

/// The operating system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}
