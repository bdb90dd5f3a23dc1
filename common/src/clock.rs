use chrono::{DateTime, Utc};

/// Wall-clock values below this (2020-09-13) mean SNTP has not run yet.
pub const TIME_SYNC_SENTINEL_EPOCH: i64 = 1_600_000_000;

/// Source of wall-clock time. Implemented by the platform layers and by
/// test doubles.
pub trait WallClock {
    fn now_utc(&self) -> DateTime<Utc>;

    fn epoch_secs(&self) -> i64 {
        self.now_utc().timestamp()
    }

    fn is_synced(&self) -> bool {
        is_time_synced(self.epoch_secs())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn is_time_synced(epoch_secs: i64) -> bool {
    epoch_secs >= TIME_SYNC_SENTINEL_EPOCH
}

/// Polls `clock` until it reports a synced time or `attempts` run out,
/// calling `sleep_ms` between polls. Returns whether sync was observed.
pub fn wait_for_time_sync<C, S>(
    clock: &C,
    attempts: u32,
    retry_delay_ms: u64,
    mut sleep_ms: S,
) -> bool
where
    C: WallClock + ?Sized,
    S: FnMut(u64),
{
    for attempt in 0..attempts {
        if clock.is_synced() {
            return true;
        }
        if attempt + 1 < attempts {
            sleep_ms(retry_delay_ms);
        }
    }
    clock.is_synced()
}
