//! Round arithmetic relative to a group's genesis

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Unix seconds for a wall-clock instant (negative before the epoch)
pub fn unix_seconds(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Round in progress at `now`
///
/// Round 1 starts at genesis and each period advances one round. Before
/// genesis no round exists and 0 is returned.
pub fn current_round(now: i64, period: Duration, genesis: i64) -> u64 {
    if now < genesis {
        return 0;
    }
    let period = period.as_secs().max(1);
    (now - genesis) as u64 / period + 1
}

/// Unix time at which `round` begins
pub fn round_time(round: u64, period: Duration, genesis: i64) -> i64 {
    if round == 0 {
        return genesis;
    }
    genesis + ((round - 1) * period.as_secs()) as i64
}

/// Time left until the first output after genesis is safely available
///
/// The target is `genesis + grace + period`. A target already in the past
/// yields a zero duration.
pub fn genesis_wait(now: SystemTime, genesis: SystemTime, grace: Duration, period: Duration) -> Duration {
    let target = genesis + grace + period;
    target.duration_since(now).unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PERIOD: Duration = Duration::from_secs(10);

    #[test]
    fn test_round_before_genesis() {
        assert_eq!(current_round(99, PERIOD, 100), 0);
    }

    #[test]
    fn test_round_progression() {
        assert_eq!(current_round(100, PERIOD, 100), 1);
        assert_eq!(current_round(109, PERIOD, 100), 1);
        assert_eq!(current_round(110, PERIOD, 100), 2);
        assert_eq!(current_round(135, PERIOD, 100), 4);
    }

    #[test]
    fn test_round_time_inverse() {
        for round in 1..20 {
            let start = round_time(round, PERIOD, 1_000);
            assert_eq!(current_round(start, PERIOD, 1_000), round);
        }
    }

    #[test]
    fn test_genesis_wait_clamps_to_zero() {
        let genesis = UNIX_EPOCH + Duration::from_secs(1_000);
        let late = genesis + Duration::from_secs(60);
        assert_eq!(
            genesis_wait(late, genesis, Duration::from_secs(3), PERIOD),
            Duration::ZERO
        );
    }

    #[test]
    fn test_genesis_wait_future() {
        let genesis = UNIX_EPOCH + Duration::from_secs(1_000);
        let now = genesis - Duration::from_secs(2);
        assert_eq!(
            genesis_wait(now, genesis, Duration::from_secs(3), PERIOD),
            Duration::from_secs(15)
        );
    }

    #[test]
    fn test_unix_seconds_before_epoch() {
        assert_eq!(unix_seconds(UNIX_EPOCH - Duration::from_secs(5)), -5);
    }
}
