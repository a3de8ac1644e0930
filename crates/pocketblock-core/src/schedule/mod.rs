//! Block schedules: named daily time windows during which apps are shielded.
//!
//! A schedule's start and end are wall-clock times of day. An end earlier
//! than the start is an overnight window (e.g. 23:00-01:00), never an error.
//! Identity and times are fixed at creation; only the name and the active
//! flag change afterwards.

mod window;

pub use window::{is_within_window, MinuteOfDay, TimeBasis, MINUTES_PER_DAY};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// A wall-clock time of day with minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "ClockTimeParts", into = "ClockTimeParts")]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

#[derive(Serialize, Deserialize)]
struct ClockTimeParts {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    /// Midnight, 00:00.
    pub const MIDNIGHT: ClockTime = ClockTime { hour: 0, minute: 0 };

    /// Build a clock time, rejecting hours outside 0-23 and minutes outside 0-59.
    pub fn new(hour: u32, minute: u32) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidClockTime { hour, minute });
        }
        Ok(Self {
            hour: hour as u8,
            minute: minute as u8,
        })
    }

    pub fn hour(self) -> u32 {
        u32::from(self.hour)
    }

    pub fn minute(self) -> u32 {
        u32::from(self.minute)
    }

    pub fn minute_of_day(self) -> MinuteOfDay {
        MinuteOfDay::from_hm(self.hour(), self.minute())
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unparsable = || ValidationError::UnparsableClockTime(s.to_string());
        let (h, m) = s.trim().split_once(':').ok_or_else(unparsable)?;
        let hour = h.parse::<u32>().map_err(|_| unparsable())?;
        let minute = m.parse::<u32>().map_err(|_| unparsable())?;
        ClockTime::new(hour, minute)
    }
}

impl TryFrom<ClockTimeParts> for ClockTime {
    type Error = ValidationError;

    fn try_from(parts: ClockTimeParts) -> Result<Self, Self::Error> {
        ClockTime::new(parts.hour, parts.minute)
    }
}

impl From<ClockTime> for ClockTimeParts {
    fn from(t: ClockTime) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
        }
    }
}

/// Opaque, stable schedule identity. Also used as the monitor (window) id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(Uuid);

impl ScheduleId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// First five characters, as shown in the debug listing.
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(5).collect()
    }
}

impl Default for ScheduleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for ScheduleId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| ValidationError::UnknownSchedule(s.to_string()))
    }
}

pub const DEFAULT_SCHEDULE_NAME: &str = "New Schedule";

/// A named daily block window.
///
/// Persisted with the camelCase flat layout
/// `{id, startHour, startMinute, endHour, endMinute, name, isActive}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ScheduleRecord", into = "ScheduleRecord")]
pub struct Schedule {
    id: ScheduleId,
    start: ClockTime,
    end: ClockTime,
    pub name: String,
    pub is_active: bool,
}

impl Schedule {
    /// Create an active schedule with a fresh id.
    pub fn new(name: impl Into<String>, start: ClockTime, end: ClockTime) -> Self {
        Self {
            id: ScheduleId::new(),
            start,
            end,
            name: name.into(),
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    pub fn id(&self) -> ScheduleId {
        self.id
    }

    pub fn start(&self) -> ClockTime {
        self.start
    }

    pub fn end(&self) -> ClockTime {
        self.end
    }

    pub fn formatted_start_time(&self) -> String {
        self.start.to_string()
    }

    pub fn formatted_end_time(&self) -> String {
        self.end.to_string()
    }

    /// True when the window runs past midnight.
    pub fn wraps_midnight(&self) -> bool {
        self.end < self.start
    }

    /// Equal start and end: accepted, but the window never matches.
    pub fn is_zero_width(&self) -> bool {
        self.start == self.end
    }

    /// Window membership, ignoring `is_active`.
    pub fn contains(&self, now: MinuteOfDay) -> bool {
        is_within_window(now, self.start.minute_of_day(), self.end.minute_of_day())
    }

    /// Active and currently inside its window.
    pub fn is_blocking_at(&self, now: MinuteOfDay) -> bool {
        self.is_active && self.contains(now)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SID: {}, {} - {}",
            self.id.short(),
            self.formatted_start_time(),
            self.formatted_end_time()
        )
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleRecord {
    id: ScheduleId,
    start_hour: u32,
    start_minute: u32,
    end_hour: u32,
    end_minute: u32,
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_active")]
    is_active: bool,
}

fn default_name() -> String {
    DEFAULT_SCHEDULE_NAME.to_string()
}

fn default_active() -> bool {
    true
}

impl TryFrom<ScheduleRecord> for Schedule {
    type Error = ValidationError;

    fn try_from(r: ScheduleRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id,
            start: ClockTime::new(r.start_hour, r.start_minute)?,
            end: ClockTime::new(r.end_hour, r.end_minute)?,
            name: r.name,
            is_active: r.is_active,
        })
    }
}

impl From<Schedule> for ScheduleRecord {
    fn from(s: Schedule) -> Self {
        Self {
            id: s.id,
            start_hour: s.start.hour(),
            start_minute: s.start.minute(),
            end_hour: s.end.hour(),
            end_minute: s.end.minute(),
            name: s.name,
            is_active: s.is_active,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().unwrap()
    }

    #[test]
    fn clock_time_rejects_out_of_range() {
        assert!(ClockTime::new(24, 0).is_err());
        assert!(ClockTime::new(0, 60).is_err());
        assert!(ClockTime::new(23, 59).is_ok());
    }

    #[test]
    fn clock_time_parses_and_formats() {
        assert_eq!(t("9:05").to_string(), "09:05");
        assert_eq!(t(" 23:00 ").minute_of_day().get(), 23 * 60);
        assert!("noon".parse::<ClockTime>().is_err());
        assert!("12:75".parse::<ClockTime>().is_err());
    }

    #[test]
    fn overnight_schedule_wraps() {
        let s = Schedule::new("Night", t("23:00"), t("01:00"));
        assert!(s.wraps_midnight());
        assert!(s.contains(t("00:30").minute_of_day()));
        assert!(!s.contains(t("12:00").minute_of_day()));
    }

    #[test]
    fn inactive_schedule_never_blocks() {
        let s = Schedule::new("Work", t("09:00"), t("17:00")).inactive();
        assert!(s.contains(t("10:00").minute_of_day()));
        assert!(!s.is_blocking_at(t("10:00").minute_of_day()));
    }

    #[test]
    fn record_layout_uses_camel_case_keys() {
        let s = Schedule::new("Work", t("09:00"), t("17:30"));
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["startHour"], 9);
        assert_eq!(json["endMinute"], 30);
        assert_eq!(json["isActive"], true);
        assert_eq!(json["name"], "Work");
    }

    #[test]
    fn record_with_invalid_hour_fails_to_decode() {
        let raw = r#"{"id":"6f1c1c1e-8b0e-4a57-9b0e-2f4f4c4d5e6f","startHour":25,"startMinute":0,"endHour":1,"endMinute":0}"#;
        assert!(serde_json::from_str::<Schedule>(raw).is_err());
    }

    #[test]
    fn record_without_name_gets_default() {
        let raw = r#"{"id":"6f1c1c1e-8b0e-4a57-9b0e-2f4f4c4d5e6f","startHour":9,"startMinute":0,"endHour":17,"endMinute":0,"isActive":false}"#;
        let s: Schedule = serde_json::from_str(raw).unwrap();
        assert_eq!(s.name, DEFAULT_SCHEDULE_NAME);
        assert!(!s.is_active);
    }

    #[test]
    fn display_matches_debug_listing() {
        let s = Schedule::new("Work", t("09:00"), t("17:00"));
        let shown = s.to_string();
        assert!(shown.starts_with("SID: "));
        assert!(shown.ends_with("09:00 - 17:00"));
    }
}
