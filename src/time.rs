//! Clock-time algebra: parsing, formatting and wrap-safe arithmetic on
//! local wall-clock "HH:MM"/"HH:MM:SS" values. Never touches a timezone.

use crate::error::EngineError;
use std::fmt;

/// A local wall-clock time of day, stored as seconds since midnight.
/// Values are kept in `[0, 86400)`; arithmetic wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime(u32);

const SECONDS_PER_DAY: i64 = 86_400;

impl ClockTime {
    pub fn from_seconds(seconds: u32) -> Self {
        ClockTime(seconds % SECONDS_PER_DAY as u32)
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        let (h, m, s) = match parts.as_slice() {
            [h, m] => (*h, *m, "0"),
            [h, m, s] => (*h, *m, *s),
            _ => {
                return Err(EngineError::Permanent(format!(
                    "invalid clock string: {raw:?}"
                )))
            }
        };
        let h: u32 = h
            .parse()
            .map_err(|_| EngineError::Permanent(format!("invalid hour in {raw:?}")))?;
        let m: u32 = m
            .parse()
            .map_err(|_| EngineError::Permanent(format!("invalid minute in {raw:?}")))?;
        let s: u32 = s
            .parse()
            .map_err(|_| EngineError::Permanent(format!("invalid second in {raw:?}")))?;
        if h > 23 || m > 59 || s > 59 {
            return Err(EngineError::Permanent(format!(
                "clock value out of range: {raw:?}"
            )));
        }
        Ok(ClockTime(h * 3600 + m * 60 + s))
    }

    pub fn total_seconds(&self) -> u32 {
        self.0
    }

    pub fn add_minutes(&self, minutes: i64) -> Self {
        self.add_seconds(minutes * 60)
    }

    pub fn add_seconds(&self, seconds: i64) -> Self {
        let total = (self.0 as i64 + seconds).rem_euclid(SECONDS_PER_DAY);
        ClockTime(total as u32)
    }

    /// Signed difference `self - other` in seconds, not wrap-normalized.
    pub fn diff_seconds(&self, other: &ClockTime) -> i64 {
        self.0 as i64 - other.0 as i64
    }

    /// Absolute difference between two clock times, accounting for wrap
    /// (i.e. the shorter of the two arcs around the 24h circle).
    pub fn wrap_abs_diff_seconds(&self, other: &ClockTime) -> u32 {
        let raw = (self.0 as i64 - other.0 as i64).unsigned_abs() as u32;
        raw.min(SECONDS_PER_DAY as u32 - raw)
    }

    /// Midpoint between two clock times, taking the shorter arc. Used for
    /// the Zohwa-e-Kubra window, which may legitimately wrap if a caller
    /// ever feeds it times that straddle midnight.
    pub fn midpoint(&self, other: &ClockTime) -> Self {
        let a = self.0 as i64;
        let mut b = other.0 as i64;
        if (b - a).abs() > SECONDS_PER_DAY / 2 {
            if b < a {
                b += SECONDS_PER_DAY;
            } else {
                b -= SECONDS_PER_DAY;
            }
        }
        ClockTime::from_seconds(((a + b) / 2).rem_euclid(SECONDS_PER_DAY) as u32)
    }

    /// Whether `self` falls in `[start, end)`, treating `end < start` as an
    /// interval that wraps past midnight.
    pub fn in_wrapping_interval(&self, start: &ClockTime, end: &ClockTime) -> bool {
        if start.0 <= end.0 {
            self.0 >= start.0 && self.0 < end.0
        } else {
            self.0 >= start.0 || self.0 < end.0
        }
    }

    pub fn format_hm(&self) -> String {
        format!("{:02}:{:02}", self.0 / 3600, (self.0 % 3600) / 60)
    }

    pub fn format_hms(&self) -> String {
        format!(
            "{:02}:{:02}:{:02}",
            self.0 / 3600,
            (self.0 % 3600) / 60,
            self.0 % 60
        )
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_hm())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hm_and_hms() {
        assert_eq!(ClockTime::parse("13:05").unwrap().format_hm(), "13:05");
        assert_eq!(ClockTime::parse("13:05:30").unwrap().format_hms(), "13:05:30");
    }

    #[test]
    fn rejects_garbage() {
        assert!(ClockTime::parse("25:00").is_err());
        assert!(ClockTime::parse("not-a-time").is_err());
        assert!(ClockTime::parse("13:60").is_err());
    }

    #[test]
    fn add_minutes_wraps_past_midnight() {
        let t = ClockTime::parse("23:50").unwrap();
        assert_eq!(t.add_minutes(20).format_hm(), "00:10");
    }

    #[test]
    fn add_minutes_handles_negative() {
        let t = ClockTime::parse("00:05").unwrap();
        assert_eq!(t.add_minutes(-10).format_hm(), "23:55");
    }

    #[test]
    fn wrapping_interval_crosses_midnight() {
        let start = ClockTime::parse("22:00").unwrap();
        let end = ClockTime::parse("02:00").unwrap();
        assert!(ClockTime::parse("23:30").unwrap().in_wrapping_interval(&start, &end));
        assert!(ClockTime::parse("01:00").unwrap().in_wrapping_interval(&start, &end));
        assert!(!ClockTime::parse("10:00").unwrap().in_wrapping_interval(&start, &end));
    }

    #[test]
    fn midpoint_is_symmetric() {
        let a = ClockTime::parse("05:00").unwrap();
        let b = ClockTime::parse("18:00").unwrap();
        assert_eq!(a.midpoint(&b).format_hm(), "11:30");
    }
}
