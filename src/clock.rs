//! Wall clock derived from one SNTP sync and the device uptime

use crate::datetime::SECS_PER_HOUR;
use crate::error::ClockError;
use crate::model::Hour;

/// 2020-01-01T00:00Z. Anything earlier is an unsynced or bogus server answer.
pub const MIN_PLAUSIBLE_UNIX: u64 = 1_577_836_800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WallClock {
    unix_at_sync: u64,
    uptime_at_sync: u64,
}

impl WallClock {
    pub fn synced(unix_secs: u64, uptime_secs: u64) -> Result<Self, ClockError> {
        if unix_secs < MIN_PLAUSIBLE_UNIX {
            return Err(ClockError::Implausible(unix_secs));
        }
        Ok(Self {
            unix_at_sync: unix_secs,
            uptime_at_sync: uptime_secs,
        })
    }

    pub fn now_unix(&self, uptime_secs: u64) -> u64 {
        self.unix_at_sync + uptime_secs.saturating_sub(self.uptime_at_sync)
    }

    pub fn current_hour(&self, uptime_secs: u64) -> Hour {
        Hour::try_from(self.now_unix(uptime_secs) / SECS_PER_HOUR).unwrap_or(Hour::MAX)
    }
}
