//! Core entities shared across the cache, calculator and scheduler.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type OwnerId = i64;

/// Composite identifier of a calculation profile. The string `AUTOMATIC`
/// must be resolved to a concrete method before it appears in any stored
/// key; see [`crate::zone::ZoneResolver::resolve_method_id`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MethodKey(pub String);

impl MethodKey {
    pub fn new(calc_method_id: i64, asr_juristic_id: i64, high_lat_id: i64) -> Self {
        MethodKey(format!("{calc_method_id}-{asr_juristic_id}-{high_lat_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Prayer {
    Fajr,
    Sunrise,
    Dhuhr,
    Asr,
    Sunset,
    Maghrib,
    Isha,
    Imsak,
    Midnight,
}

impl Prayer {
    pub fn key(&self) -> &'static str {
        match self {
            Prayer::Fajr => "fajr",
            Prayer::Sunrise => "sunrise",
            Prayer::Dhuhr => "dhuhr",
            Prayer::Asr => "asr",
            Prayer::Sunset => "sunset",
            Prayer::Maghrib => "maghrib",
            Prayer::Isha => "isha",
            Prayer::Imsak => "imsak",
            Prayer::Midnight => "midnight",
        }
    }

    /// The five daily prayers that receive a director's-script jamaat
    /// event, in chronological order.
    pub const DAILY_SEQUENCE: [Prayer; 5] = [
        Prayer::Fajr,
        Prayer::Dhuhr,
        Prayer::Asr,
        Prayer::Maghrib,
        Prayer::Isha,
    ];
}

/// One day's raw astronomical timings, keyed by prayer name, as returned
/// by the prayer-time adapter. Missing entries are legitimately absent,
/// never sentinel strings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DailyTimings {
    pub timings: BTreeMap<String, String>,
}

impl DailyTimings {
    pub fn get(&self, prayer: &Prayer) -> Option<&str> {
        self.timings.get(prayer.key()).map(|s| s.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YearlyCalendar {
    pub zone_id: String,
    pub year: i32,
    pub method_key: MethodKey,
    pub schema_version: String,
    /// Index `k` holds day-of-year `k + 1` of `year`.
    pub days: Vec<DailyTimings>,
    pub content_hash: String,
    pub created_at: i64,
    pub updated_at: i64,
}

impl YearlyCalendar {
    pub fn cache_key(schema: &str, zone_id: &str, year: i32, method_key: &MethodKey) -> String {
        format!("calendar:{schema}:{zone_id}:{year}:{}", method_key.as_str())
    }
}

/// An individual prayer's rule: either a fixed published clock string, or
/// an offset to apply to the raw astronomical time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode")]
pub enum PrayerTimeRule {
    Fixed { azan: String, jamaat: String },
    Offset { azan_offset: i32, jamaat_offset: i32 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JummahRule {
    Fixed {
        azan: String,
        khutbah: String,
        jamaat: String,
    },
    Offset {
        azan_offset: i32,
        khutbah_offset: i32,
        jamaat_offset: i32,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerSettings {
    pub owner_id: OwnerId,
    pub latitude: f64,
    pub longitude: f64,
    pub method_key: MethodKey,
    pub timezone: String,
    pub threshold_minutes: u32,
    pub rules: BTreeMap<String, PrayerTimeRule>,
    pub jummah: JummahRule,
    pub hijri_offset_days: i32,
}

impl OwnerSettings {
    pub fn rule_for(&self, prayer: &Prayer) -> Option<&PrayerTimeRule> {
        self.rules.get(prayer.key())
    }
}

/// The last raw astronomical times the offset-mode calculator used, kept
/// per owner to implement threshold stability (Component E).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LastRawTimes {
    pub raw: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum IntervalKind {
    PrePrayerIdle,
    PreAzanWindow,
    PreJamaatAlert,
    Jamaat,
    PostJamaatInfo,
    PostPrayerIdle,
    Jummah,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptInterval {
    pub kind: IntervalKind,
    pub prayer: String,
    /// Seconds since the start of the month.
    pub start_offset_secs: i64,
    pub end_offset_secs: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonthlySchedule {
    pub owner_id: OwnerId,
    pub year: i32,
    pub month: u32,
    pub version: u32,
    pub script_hash: String,
    pub generated_at: i64,
    pub updated_at: i64,
    pub warnings: Vec<String>,
    pub script: Vec<ScriptInterval>,
}

impl MonthlySchedule {
    pub fn cache_key(owner_id: OwnerId, year: i32, month: u32) -> String {
        format!("schedule:{owner_id}:{year}:{month:02}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneAlias {
    pub source_zone_id: String,
    pub target_zone_id: String,
    pub method_key: MethodKey,
}
