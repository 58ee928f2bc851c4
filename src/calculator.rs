//! Personal calculator (Component E): turns one day's raw astronomical
//! timings plus an owner's rule block into display-ready azan/jamaat
//! times, applying the boundary safety buffer and offset-mode threshold
//! stability.

use crate::domain::{DailyTimings, JummahRule, LastRawTimes, OwnerSettings, Prayer, PrayerTimeRule};
use crate::time::ClockTime;
use std::collections::BTreeMap;

const BOUNDARY_SAFETY_BUFFER_SECS: i64 = 8 * 60;

#[derive(Debug, Clone)]
pub struct PrayerDisplay {
    pub azan: Option<ClockTime>,
    pub jamaat: Option<ClockTime>,
}

#[derive(Debug, Clone)]
pub struct JummahDisplay {
    pub azan: Option<ClockTime>,
    pub khutbah: Option<ClockTime>,
    pub jamaat: Option<ClockTime>,
}

#[derive(Debug, Clone)]
pub struct DisplayTimes {
    pub prayers: BTreeMap<String, PrayerDisplay>,
    pub jummah: JummahDisplay,
    pub iftari: Option<ClockTime>,
    pub sehri_end: Option<ClockTime>,
    pub chasht: Option<ClockTime>,
    pub zohwa_kubra_start: Option<ClockTime>,
    pub zohwa_kubra_end: Option<ClockTime>,
    pub warnings: Vec<String>,
    pub needs_persist: bool,
    pub updated_raw: LastRawTimes,
}

/// Seconds walking forward from `origin` to `point`, wrapping past
/// midnight. Used to test whether a point falls inside the prayer's
/// interval regardless of whether that interval itself wraps (Isha's
/// closing boundary is tomorrow's Fajr).
fn forward_offset(point: &ClockTime, origin: &ClockTime) -> i64 {
    (point.total_seconds() as i64 - origin.total_seconds() as i64).rem_euclid(86_400)
}

/// Applies the 8-minute safety buffer: azan clamped up to `raw_start`,
/// jamaat clamped down to `next_start - buffer`. Returns a warning string
/// when a clamp actually fired.
fn apply_boundary_check(
    prayer: &str,
    azan: ClockTime,
    jamaat: ClockTime,
    raw_start: ClockTime,
    next_start: ClockTime,
) -> (ClockTime, ClockTime, Option<String>) {
    let mut warning = None;
    let effective_upper = next_start.add_seconds(-BOUNDARY_SAFETY_BUFFER_SECS);
    let bound = forward_offset(&effective_upper, &raw_start);

    let azan = if forward_offset(&azan, &raw_start) > bound {
        warning = Some(format!("{prayer}: azan clamped to raw start"));
        raw_start
    } else {
        azan
    };

    let jamaat = if forward_offset(&jamaat, &raw_start) > bound {
        warning = Some(format!("{prayer}: jamaat clamped to boundary"));
        effective_upper
    } else {
        jamaat
    };

    (azan, jamaat, warning)
}

/// Computes one prayer's display times from its rule, raw start/next-start
/// pair and (for offset mode) the threshold-stability state.
fn compute_prayer(
    prayer: &Prayer,
    rule: &PrayerTimeRule,
    raw_start: Option<ClockTime>,
    next_start: Option<ClockTime>,
    threshold_minutes: u32,
    previous_raw: Option<ClockTime>,
    warnings: &mut Vec<String>,
    needs_persist: &mut bool,
) -> (PrayerDisplay, Option<ClockTime>) {
    let (Some(raw_start), Some(next_start)) = (raw_start, next_start) else {
        return (PrayerDisplay { azan: None, jamaat: None }, raw_start);
    };

    match rule {
        PrayerTimeRule::Fixed { azan, jamaat } => {
            let (Ok(azan), Ok(jamaat)) = (ClockTime::parse(azan), ClockTime::parse(jamaat)) else {
                warnings.push(format!("{}: invalid fixed time configured", prayer.key()));
                return (PrayerDisplay { azan: None, jamaat: None }, Some(raw_start));
            };
            let (azan, jamaat, warning) =
                apply_boundary_check(prayer.key(), azan, jamaat, raw_start, next_start);
            if let Some(w) = warning {
                warnings.push(w);
            }
            (
                PrayerDisplay {
                    azan: Some(azan),
                    jamaat: Some(jamaat),
                },
                Some(raw_start),
            )
        }
        PrayerTimeRule::Offset {
            azan_offset,
            jamaat_offset,
        } => {
            let effective_raw = match previous_raw {
                Some(prev) if raw_start.wrap_abs_diff_seconds(&prev) < threshold_minutes * 60 => prev,
                _ => {
                    *needs_persist = true;
                    raw_start
                }
            };
            let azan = effective_raw.add_minutes(*azan_offset as i64);
            let jamaat = azan.add_minutes(*jamaat_offset as i64);
            let (azan, jamaat, warning) =
                apply_boundary_check(prayer.key(), azan, jamaat, raw_start, next_start);
            if let Some(w) = warning {
                warnings.push(w);
            }
            (
                PrayerDisplay {
                    azan: Some(azan),
                    jamaat: Some(jamaat),
                },
                Some(raw_start),
            )
        }
    }
}

fn raw_time(timings: &DailyTimings, prayer: &Prayer) -> Option<ClockTime> {
    timings.get(prayer).and_then(|s| ClockTime::parse(s).ok())
}

/// Computes a full day's display times. `tomorrow_fajr` supplies Isha's
/// closing boundary.
pub fn calculate_display_times(
    settings: &OwnerSettings,
    today: &DailyTimings,
    tomorrow: &DailyTimings,
    last_raw: &LastRawTimes,
    is_friday: bool,
) -> DisplayTimes {
    let mut warnings = Vec::new();
    let mut needs_persist = false;
    let mut updated_raw = last_raw.clone();
    let mut prayers = BTreeMap::new();

    let next_starts: BTreeMap<&str, Option<ClockTime>> = [
        (Prayer::Fajr.key(), raw_time(today, &Prayer::Dhuhr)),
        (Prayer::Dhuhr.key(), raw_time(today, &Prayer::Asr)),
        (Prayer::Asr.key(), raw_time(today, &Prayer::Maghrib)),
        (Prayer::Maghrib.key(), raw_time(today, &Prayer::Isha)),
        (Prayer::Isha.key(), raw_time(tomorrow, &Prayer::Fajr)),
    ]
    .into_iter()
    .collect();

    for prayer in Prayer::DAILY_SEQUENCE.iter() {
        let Some(rule) = settings.rule_for(prayer) else {
            continue;
        };
        let raw_start = raw_time(today, prayer);
        let next_start = next_starts.get(prayer.key()).copied().flatten();
        let previous_raw = updated_raw
            .raw
            .get(prayer.key())
            .and_then(|s| ClockTime::parse(s).ok());

        let (display, effective_raw) = compute_prayer(
            prayer,
            rule,
            raw_start,
            next_start,
            settings.threshold_minutes,
            previous_raw,
            &mut warnings,
            &mut needs_persist,
        );
        if let Some(raw) = effective_raw {
            updated_raw.raw.insert(prayer.key().to_string(), raw.format_hms());
        }
        prayers.insert(prayer.key().to_string(), display);
    }

    let jummah = if is_friday {
        compute_jummah(settings, today, &mut warnings)
    } else {
        JummahDisplay {
            azan: None,
            khutbah: None,
            jamaat: None,
        }
    };

    let fajr = raw_time(today, &Prayer::Fajr);
    let sunset = raw_time(today, &Prayer::Sunset).or_else(|| raw_time(today, &Prayer::Maghrib));
    let sunrise = raw_time(today, &Prayer::Sunrise);

    let zohwa_kubra_start = match (fajr, sunset) {
        (Some(a), Some(b)) => Some(a.midpoint(&b)),
        _ => None,
    };
    let zohwa_kubra_end = match (sunrise, sunset) {
        (Some(a), Some(b)) => Some(a.midpoint(&b)),
        _ => None,
    };
    let chasht = sunrise.map(|s| s.add_seconds(20 * 60 + 30));

    DisplayTimes {
        prayers,
        jummah,
        iftari: raw_time(today, &Prayer::Maghrib),
        sehri_end: raw_time(today, &Prayer::Imsak),
        chasht,
        zohwa_kubra_start,
        zohwa_kubra_end,
        warnings,
        needs_persist,
        updated_raw,
    }
}

fn compute_jummah(settings: &OwnerSettings, today: &DailyTimings, warnings: &mut Vec<String>) -> JummahDisplay {
    match &settings.jummah {
        JummahRule::Fixed { azan, khutbah, jamaat } => JummahDisplay {
            azan: ClockTime::parse(azan).ok(),
            khutbah: ClockTime::parse(khutbah).ok(),
            jamaat: ClockTime::parse(jamaat).ok(),
        },
        JummahRule::Offset {
            azan_offset,
            khutbah_offset,
            jamaat_offset,
        } => {
            let Some(dhuhr_raw) = raw_time(today, &Prayer::Dhuhr) else {
                warnings.push("jummah: missing Dhuhr raw time".to_string());
                return JummahDisplay {
                    azan: None,
                    khutbah: None,
                    jamaat: None,
                };
            };
            JummahDisplay {
                azan: Some(dhuhr_raw.add_minutes(*azan_offset as i64)),
                khutbah: Some(dhuhr_raw.add_minutes(*khutbah_offset as i64)),
                jamaat: Some(dhuhr_raw.add_minutes(*jamaat_offset as i64)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MethodKey;

    fn day(entries: &[(&str, &str)]) -> DailyTimings {
        let mut timings = BTreeMap::new();
        for (k, v) in entries {
            timings.insert(k.to_string(), v.to_string());
        }
        DailyTimings { timings }
    }

    fn base_settings(rules: BTreeMap<String, PrayerTimeRule>) -> OwnerSettings {
        OwnerSettings {
            owner_id: 1,
            latitude: 0.0,
            longitude: 0.0,
            method_key: MethodKey::new(3, 0, 1),
            timezone: "Asia/Kolkata".to_string(),
            threshold_minutes: 5,
            rules,
            jummah: JummahRule::Offset {
                azan_offset: 15,
                khutbah_offset: 30,
                jamaat_offset: 30,
            },
            hijri_offset_days: 0,
        }
    }

    #[test]
    fn scenario_1_dhuhr_offset_mode() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "dhuhr".to_string(),
            PrayerTimeRule::Offset {
                azan_offset: 15,
                jamaat_offset: 15,
            },
        );
        let settings = base_settings(rules);
        let today = day(&[("dhuhr", "13:00"), ("asr", "17:00")]);
        let tomorrow = day(&[]);
        let result = calculate_display_times(&settings, &today, &tomorrow, &LastRawTimes::default(), false);
        let dhuhr = &result.prayers["dhuhr"];
        assert_eq!(dhuhr.azan.unwrap().format_hm(), "13:15");
        assert_eq!(dhuhr.jamaat.unwrap().format_hm(), "13:30");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn scenario_2_isha_fixed_inside_interval() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "isha".to_string(),
            PrayerTimeRule::Fixed {
                azan: "22:10".to_string(),
                jamaat: "22:40".to_string(),
            },
        );
        let settings = base_settings(rules);
        let today = day(&[("isha", "20:00")]);
        let tomorrow = day(&[("fajr", "05:00")]);
        let result = calculate_display_times(&settings, &today, &tomorrow, &LastRawTimes::default(), false);
        let isha = &result.prayers["isha"];
        assert_eq!(isha.azan.unwrap().format_hm(), "22:10");
        assert_eq!(isha.jamaat.unwrap().format_hm(), "22:40");
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn scenario_3_jummah_on_friday() {
        let settings = base_settings(BTreeMap::new());
        let today = day(&[("dhuhr", "12:30")]);
        let tomorrow = day(&[]);
        let result = calculate_display_times(&settings, &today, &tomorrow, &LastRawTimes::default(), true);
        assert_eq!(result.jummah.azan.unwrap().format_hm(), "12:45");
        assert_eq!(result.jummah.khutbah.unwrap().format_hm(), "13:00");
        assert_eq!(result.jummah.jamaat.unwrap().format_hm(), "13:00");
    }

    #[test]
    fn jamaat_clamped_past_boundary_emits_warning() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "dhuhr".to_string(),
            PrayerTimeRule::Offset {
                azan_offset: 0,
                jamaat_offset: 1000,
            },
        );
        let settings = base_settings(rules);
        let today = day(&[("dhuhr", "13:00"), ("asr", "13:10")]);
        let tomorrow = day(&[]);
        let result = calculate_display_times(&settings, &today, &tomorrow, &LastRawTimes::default(), false);
        let dhuhr = &result.prayers["dhuhr"];
        assert_eq!(dhuhr.jamaat.unwrap().format_hm(), "13:02");
        assert!(!result.warnings.is_empty());
    }

    #[test]
    fn threshold_stability_keeps_previous_raw() {
        let mut rules = BTreeMap::new();
        rules.insert(
            "fajr".to_string(),
            PrayerTimeRule::Offset {
                azan_offset: 10,
                jamaat_offset: 20,
            },
        );
        let settings = base_settings(rules);
        let today = day(&[("fajr", "05:02"), ("dhuhr", "12:00")]);
        let tomorrow = day(&[]);
        let mut last_raw = LastRawTimes::default();
        last_raw.raw.insert("fajr".to_string(), "05:00:00".to_string());
        let result = calculate_display_times(&settings, &today, &tomorrow, &last_raw, false);
        assert_eq!(result.prayers["fajr"].azan.unwrap().format_hm(), "05:10");
        assert!(!result.needs_persist);
    }

    #[test]
    fn iftari_and_sehri_end_mirror_maghrib_and_imsak() {
        let settings = base_settings(BTreeMap::new());
        let today = day(&[("maghrib", "19:00"), ("imsak", "04:30")]);
        let tomorrow = day(&[]);
        let result = calculate_display_times(&settings, &today, &tomorrow, &LastRawTimes::default(), false);
        assert_eq!(result.iftari.unwrap().format_hm(), "19:00");
        assert_eq!(result.sehri_end.unwrap().format_hm(), "04:30");
    }
}
