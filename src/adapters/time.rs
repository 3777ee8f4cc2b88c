//! Wall-clock time adapter.
//!
//! Implements [`TimeSource`] from `std::time::SystemTime`. The zone is a
//! fixed offset supplied by the host (UTC by default); zone databases are
//! the host's business.

use std::time::{SystemTime, UNIX_EPOCH};

use log::warn;

use crate::app::ports::{LocalTime, TimeSource};

pub struct SystemClock {
    zone_name: String,
    zone_offset_secs: i32,
    dst_offset_secs: i32,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::utc()
    }
}

impl SystemClock {
    pub fn utc() -> Self {
        Self::with_zone("UTC", 0, 0)
    }

    pub fn with_zone(zone_name: impl Into<String>, zone_offset_secs: i32, dst_offset_secs: i32) -> Self {
        Self {
            zone_name: zone_name.into(),
            zone_offset_secs,
            dst_offset_secs,
        }
    }

    /// Local time for `unix_millis` milliseconds since the epoch.
    pub fn at(&self, unix_millis: i64) -> LocalTime {
        let offset_ms = i64::from(self.zone_offset_secs + self.dst_offset_secs) * 1000;
        let local = unix_millis + offset_ms;
        let days = local.div_euclid(86_400_000);
        let ms_of_day = local.rem_euclid(86_400_000);
        let (year, month, day) = civil_from_days(days);

        LocalTime {
            year: year as u16,
            month,
            day,
            hour: (ms_of_day / 3_600_000) as u8,
            minute: (ms_of_day / 60_000 % 60) as u8,
            second: (ms_of_day / 1000 % 60) as u8,
            millisecond: (ms_of_day % 1000) as u16,
            zone_offset_secs: self.zone_offset_secs,
            dst_offset_secs: self.dst_offset_secs,
            zone_name: self.zone_name.clone(),
        }
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> LocalTime {
        let millis = match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(_) => {
                warn!("time: system clock before 1970, using epoch");
                0
            }
        };
        self.at(millis)
    }
}

/// Days since 1970-01-01 → (year, month, day), proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}
