//! Window predicate.
//!
//! Everything is compared as minute-of-day integers. Start and end are stored
//! as wall-clock minutes and never converted; `now` is converted exactly once,
//! through a [`TimeBasis`] that owns the single UTC offset in use.
//!
//! The end boundary is exclusive:
//!
//! ```text
//! end >= start   start <= now < end
//! end <  start   now >= start || now < end
//! ```
//!
//! so `start == end` never matches, and back-to-back daily windows never
//! overlap at the boundary minute.

use chrono::{DateTime, FixedOffset, Local, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};

pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Minutes since midnight, always `< 1440`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    /// Wraps values past the end of the day.
    pub fn new(minutes: u32) -> Self {
        Self((minutes % u32::from(MINUTES_PER_DAY)) as u16)
    }

    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self::new(hour * 60 + minute)
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

impl std::fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

/// Is `now` inside the window `[start, end)`, wrapping past midnight when
/// `end < start`.
pub fn is_within_window(now: MinuteOfDay, start: MinuteOfDay, end: MinuteOfDay) -> bool {
    if end >= start {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// The one reference zone used to turn an instant into a minute of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBasis {
    offset: FixedOffset,
}

impl TimeBasis {
    pub fn fixed(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::fixed(Utc.fix())
    }

    /// The device's current local offset, captured once.
    pub fn local() -> Self {
        Self::fixed(*Local::now().offset())
    }

    /// Fixed offset in minutes east of UTC; `None` captures the local offset.
    /// Out-of-range offsets fall back to UTC.
    pub fn from_offset_minutes(minutes: Option<i32>) -> Self {
        match minutes {
            Some(m) => m
                .checked_mul(60)
                .and_then(FixedOffset::east_opt)
                .map(Self::fixed)
                .unwrap_or_else(|| {
                    tracing::warn!(offset_minutes = m, "invalid utc offset, using UTC");
                    Self::utc()
                }),
            None => Self::local(),
        }
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn minute_of_day(&self, at: DateTime<Utc>) -> MinuteOfDay {
        let local = at.with_timezone(&self.offset);
        MinuteOfDay::from_hm(local.hour(), local.minute())
    }
}
