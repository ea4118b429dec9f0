//! Modification times stored with each entry
//!
//! ZIP stores local calendar time in MS-DOS format: two-second resolution,
//! years 1980 to 2107. [`Timestamp`] keeps plain calendar fields and packs
//! them when an entry header is written.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use std::path::Path;
use std::time::SystemTime;

const DOS_MIN_YEAR: u16 = 1980;
const DOS_MAX_YEAR: u16 = 2107;

/// Calendar time of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub year: u16,
    /// 1-12
    pub month: u8,
    /// 1-31
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl Timestamp {
    pub fn new(year: u16, month: u8, day: u8, hour: u8, minute: u8, second: u8) -> Self {
        Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        }
    }

    /// Current local time
    pub fn now() -> Self {
        Self::from_datetime(&Local::now())
    }

    /// Local time of a system time
    pub fn from_system_time(time: SystemTime) -> Self {
        Self::from_datetime(&DateTime::<Local>::from(time))
    }

    /// Last modification time of `path`, or the current time when unavailable
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match std::fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => Self::from_system_time(modified),
            Err(e) => {
                log::warn!(
                    "cannot read modification time of '{}': {}; using now",
                    path.display(),
                    e
                );
                Self::now()
            }
        }
    }

    fn from_datetime<Tz: TimeZone>(dt: &DateTime<Tz>) -> Self {
        Self {
            year: dt.year().clamp(0, u16::MAX as i32) as u16,
            month: dt.month() as u8,
            day: dt.day() as u8,
            hour: dt.hour() as u8,
            minute: dt.minute() as u8,
            second: dt.second().min(59) as u8,
        }
    }

    /// Pack as MS-DOS `(time, date)`
    ///
    /// Years outside 1980..=2107 clamp to the first or last representable
    /// instant; seconds are truncated to even values.
    pub fn to_dos(&self) -> (u16, u16) {
        if self.year < DOS_MIN_YEAR {
            return (0, (1 << 5) | 1);
        }
        if self.year > DOS_MAX_YEAR {
            return (
                (23 << 11) | (59 << 5) | 29,
                ((DOS_MAX_YEAR - DOS_MIN_YEAR) << 9) | (12 << 5) | 31,
            );
        }

        let month = self.month.clamp(1, 12) as u16;
        let day = self.day.clamp(1, 31) as u16;
        let hour = self.hour.min(23) as u16;
        let minute = self.minute.min(59) as u16;
        let second = self.second.min(59) as u16;

        let time = (hour << 11) | (minute << 5) | (second / 2);
        let date = ((self.year - DOS_MIN_YEAR) << 9) | (month << 5) | day;
        (time, date)
    }

    /// Unpack an MS-DOS `(time, date)` pair
    pub fn from_dos(time: u16, date: u16) -> Self {
        Self {
            year: DOS_MIN_YEAR + (date >> 9),
            month: ((date >> 5) & 0x0f) as u8,
            day: (date & 0x1f) as u8,
            hour: (time >> 11) as u8,
            minute: ((time >> 5) & 0x3f) as u8,
            second: ((time & 0x1f) * 2) as u8,
        }
    }
}
