//! Shared types for the EVR timing front-end: event codes, receiver
//! timestamps, the alarm model, and the record facade the data-plane engines
//! are driven through.

pub mod alarm;
pub mod link;
pub mod record;

use std::ops::Sub;

/// Number of distinct hardware event codes.
pub const N_EVENTS: usize = 256;

/// Event code carried by a hardware timing event.
///
/// Code 0 is reserved: the receiver never fires it, and the engines use it to
/// mean "no subscription" / "no assignment".
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct EventCode(pub u8);

impl EventCode {
    pub const NONE: EventCode = EventCode(0);

    /// Values outside [0, 255] are coerced to `NONE` silently.
    pub fn from_clamped(raw: i64) -> Self {
        match u8::try_from(raw) {
            Ok(code) => EventCode(code),
            Err(_) => EventCode::NONE,
        }
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Debug for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::fmt::Display for EventCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Timestamp in the records-database epoch (1990-01-01).
#[derive(Copy, Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TimeStamp {
    pub sec: u32,
    pub nsec: u32,
}

impl TimeStamp {
    /// Seconds between the POSIX epoch and the records epoch: 20 years of
    /// 365.25 days.
    pub const EPOCH_OFFSET_SECS: u32 = 631_152_000;

    pub const fn new(sec: u32, nsec: u32) -> Self {
        TimeStamp { sec, nsec }
    }

    /// Convert the tail of a receiver log triple. `secs` is POSIX seconds;
    /// `ticks` scales by `nsec_per_tick`, rounded half up.
    pub fn from_log(secs: u32, ticks: u32, nsec_per_tick: f64) -> Self {
        TimeStamp {
            sec: secs.wrapping_sub(Self::EPOCH_OFFSET_SECS),
            nsec: (ticks as f64 * nsec_per_tick + 0.5) as u32,
        }
    }
}

/// Difference in seconds, as buffer consumers expose it.
impl Sub for TimeStamp {
    type Output = f64;

    fn sub(self, rhs: Self) -> f64 {
        (self.sec as i64 - rhs.sec as i64) as f64
            + (self.nsec as i64 - rhs.nsec as i64) as f64 * 1e-9
    }
}
