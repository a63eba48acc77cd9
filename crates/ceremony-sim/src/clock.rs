//! Wall clock driven by the tokio timer

use std::time::SystemTime;

use tokio::time::Instant;

use ceremony_core::Clock;

/// Wall clock that advances with tokio time
///
/// Under a paused runtime, wall-clock reads follow the auto-advanced timer,
/// so genesis waits and round computations agree with `sleep`.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    base: SystemTime,
    start: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self::starting_at(SystemTime::now())
    }

    /// Clock reading `base` at the current tokio instant
    pub fn starting_at(base: SystemTime) -> Self {
        Self {
            base,
            start: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> SystemTime {
        self.base + self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};

    #[tokio::test(start_paused = true)]
    async fn test_follows_paused_time() {
        let base = UNIX_EPOCH + Duration::from_secs(1_000);
        let clock = TokioClock::starting_at(base);

        tokio::time::sleep(Duration::from_secs(42)).await;

        assert_eq!(clock.now(), base + Duration::from_secs(42));
    }
}
