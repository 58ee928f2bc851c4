//! Schedule materializer (Component F): the month's "director's script" of
//! ordered, non-overlapping state-interval events.

use crate::calculator::{calculate_display_times, DisplayTimes};
use crate::calendar::CalendarService;
use crate::domain::{IntervalKind, MonthlySchedule, OwnerId, ScriptInterval};
use crate::error::EngineError;
use crate::repo::{OwnerRepo, ScheduleRepo, SettingsRepo};
use crate::time::ClockTime;
use crate::zone::ZoneResolver;
use chrono::{Datelike, Duration as ChronoDuration, NaiveDate, Weekday};
use sha2::{Digest, Sha256};
use std::sync::Arc;

const PRE_JAMAAT_ALERT_SECONDS: i64 = 120;
const POST_JAMAAT_INFO_SECONDS: i64 = 600;

pub struct ScheduleMaterializer {
    calendar: Arc<CalendarService>,
    schedules: Arc<dyn ScheduleRepo>,
    settings: Arc<dyn SettingsRepo>,
    owners: Arc<dyn OwnerRepo>,
    zone_resolver: Arc<ZoneResolver>,
}

impl ScheduleMaterializer {
    pub fn new(
        calendar: Arc<CalendarService>,
        schedules: Arc<dyn ScheduleRepo>,
        settings: Arc<dyn SettingsRepo>,
        owners: Arc<dyn OwnerRepo>,
        zone_resolver: Arc<ZoneResolver>,
    ) -> Self {
        ScheduleMaterializer {
            calendar,
            schedules,
            settings,
            owners,
            zone_resolver,
        }
    }

    /// Resolves the owner a schedule request should actually be built
    /// and cached under: the collective owner a follower follows, or the
    /// requester themself.
    pub async fn resolve_schedule_owner(&self, requester_id: OwnerId) -> Result<OwnerId, EngineError> {
        Ok(self
            .owners
            .collective_target(requester_id)
            .await?
            .unwrap_or(requester_id))
    }

    pub async fn get_or_generate_monthly(
        &self,
        requester_id: OwnerId,
        year: i32,
        month: u32,
        force_regenerate: bool,
    ) -> Result<MonthlySchedule, EngineError> {
        let owner_id = self.resolve_schedule_owner(requester_id).await?;

        if !force_regenerate {
            if let Some(existing) = self.schedules.get(owner_id, year, month).await? {
                return Ok(existing);
            }
        }

        let generated = self.generate_schedule_for_owner(owner_id, year, month).await?;
        self.save_schedule(generated).await
    }

    async fn save_schedule(&self, mut schedule: MonthlySchedule) -> Result<MonthlySchedule, EngineError> {
        let existing = self
            .schedules
            .get(schedule.owner_id, schedule.year, schedule.month)
            .await?;
        match existing {
            Some(existing) if existing.script_hash == schedule.script_hash => Ok(existing),
            Some(existing) => {
                schedule.version = existing.version + 1;
                self.schedules.upsert(schedule.clone()).await?;
                Ok(schedule)
            }
            None => {
                schedule.version = 1;
                self.schedules.upsert(schedule.clone()).await?;
                Ok(schedule)
            }
        }
    }

    async fn generate_schedule_for_owner(
        &self,
        owner_id: OwnerId,
        year: i32,
        month: u32,
    ) -> Result<MonthlySchedule, EngineError> {
        let settings = self
            .settings
            .get(owner_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("owner {owner_id} has no settings")))?;
        let last_raw = self.settings.get_last_raw_times(owner_id).await?.unwrap_or_default();

        let first_of_month = NaiveDate::from_ymd_opt(year, month, 1)
            .ok_or_else(|| EngineError::Permanent(format!("invalid year/month {year}-{month}")))?;
        let days_in_month = days_in_month(year, month);

        let zone_id = self
            .zone_resolver
            .resolve_zone(settings.latitude, settings.longitude, &settings.method_key, year)
            .await?;

        let mut script = Vec::new();
        let mut warnings = Vec::new();
        let mut running_raw = last_raw;

        for day_idx in 0..days_in_month {
            let date = first_of_month + ChronoDuration::days(day_idx as i64);
            let tomorrow = date + ChronoDuration::days(1);

            let today_raw = self
                .calendar
                .get_daily(&zone_id, date, settings.latitude, settings.longitude, &settings.method_key)
                .await?;
            let tomorrow_raw = self
                .calendar
                .get_daily(&zone_id, tomorrow, settings.latitude, settings.longitude, &settings.method_key)
                .await
                .unwrap_or_default();

            let is_friday = date.weekday() == Weekday::Fri;
            let display = calculate_display_times(&settings, &today_raw, &tomorrow_raw, &running_raw, is_friday);
            warnings.extend(display.warnings.clone());
            if display.needs_persist {
                running_raw = display.updated_raw.clone();
            }

            let day_offset = day_idx as i64 * 86_400;
            script.extend(day_script(day_offset, &display, is_friday));
        }

        warnings.sort();
        warnings.dedup();

        let script_hash = hash_script(&script);
        let now = now_unix();

        Ok(MonthlySchedule {
            owner_id,
            year,
            month,
            version: 0,
            script_hash,
            generated_at: now,
            updated_at: now,
            warnings,
            script,
        })
    }
}

/// Builds one day's ordered, gap-free interval sequence from its display
/// times. Friday's Dhuhr jamaat event is replaced by Jummah.
fn day_script(day_offset_secs: i64, display: &DisplayTimes, is_friday: bool) -> Vec<ScriptInterval> {
    let mut events: Vec<(&str, Option<ClockTime>, ClockTime)> = Vec::new();
    for prayer in crate::domain::Prayer::DAILY_SEQUENCE.iter() {
        if is_friday && prayer.key() == "dhuhr" {
            continue;
        }
        if let Some(p) = display.prayers.get(prayer.key()) {
            if let Some(jamaat) = p.jamaat {
                events.push((prayer.key(), p.azan, jamaat));
            }
        }
    }
    if is_friday {
        if let Some(jamaat) = display.jummah.jamaat {
            events.push(("jummah", display.jummah.azan, jamaat));
        }
    }
    events.sort_by_key(|(_, _, jamaat)| jamaat.total_seconds());

    let mut intervals = Vec::new();
    let mut cursor: i64 = 0;
    const DAY_SECONDS: i64 = 86_400;

    for (name, azan, jamaat) in &events {
        let kind = if *name == "jummah" {
            IntervalKind::Jummah
        } else {
            IntervalKind::Jamaat
        };
        // A jamaat time that falls before `cursor` (two jamaats within the
        // previous event's post-jamaat window, e.g. tight Maghrib->Isha)
        // would otherwise open an interval that starts before the previous
        // one ended; pin it to `cursor` so intervals stay ordered.
        let jamaat_secs = (jamaat.total_seconds() as i64).max(cursor);
        let pre_alert_start = (jamaat_secs - PRE_JAMAAT_ALERT_SECONDS).max(cursor);

        let azan_secs = azan.map(|a| (a.total_seconds() as i64).clamp(cursor, pre_alert_start));
        let idle_end = azan_secs.unwrap_or(pre_alert_start);
        if idle_end > cursor {
            intervals.push(interval(day_offset_secs, IntervalKind::PrePrayerIdle, name, cursor, idle_end));
        }
        if let Some(azan_secs) = azan_secs {
            if pre_alert_start > azan_secs {
                intervals.push(interval(day_offset_secs, IntervalKind::PreAzanWindow, name, azan_secs, pre_alert_start));
            }
        }
        if jamaat_secs > pre_alert_start {
            intervals.push(interval(
                day_offset_secs,
                IntervalKind::PreJamaatAlert,
                name,
                pre_alert_start,
                jamaat_secs,
            ));
        }
        let jamaat_end = jamaat_secs + 1;
        intervals.push(interval(day_offset_secs, kind, name, jamaat_secs, jamaat_end));
        let post_end = (jamaat_end + POST_JAMAAT_INFO_SECONDS).min(DAY_SECONDS);
        if post_end > jamaat_end {
            intervals.push(interval(day_offset_secs, IntervalKind::PostJamaatInfo, name, jamaat_end, post_end));
        }
        cursor = post_end;
    }

    if cursor < DAY_SECONDS {
        let last_name = events.last().map(|(n, ..)| *n).unwrap_or("none");
        intervals.push(interval(day_offset_secs, IntervalKind::PostPrayerIdle, last_name, cursor, DAY_SECONDS));
    }

    intervals
}

fn interval(day_offset: i64, kind: IntervalKind, prayer: &str, start: i64, end: i64) -> ScriptInterval {
    ScriptInterval {
        kind,
        prayer: prayer.to_string(),
        start_offset_secs: day_offset + start,
        end_offset_secs: day_offset + end,
    }
}

fn days_in_month(year: i32, month: u32) -> u32 {
    let next_month_first = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid next-month date");
    let this_month_first = NaiveDate::from_ymd_opt(year, month, 1).expect("valid month");
    (next_month_first - this_month_first).num_days() as u32
}

fn hash_script(script: &[ScriptInterval]) -> String {
    let canonical = serde_json::to_string(script).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculator::PrayerDisplay;
    use std::collections::BTreeMap;

    fn display_with(events: &[(&str, &str)]) -> DisplayTimes {
        let mut prayers = BTreeMap::new();
        for (name, time) in events {
            prayers.insert(
                name.to_string(),
                PrayerDisplay {
                    azan: ClockTime::parse(time).ok(),
                    jamaat: ClockTime::parse(time).ok(),
                },
            );
        }
        DisplayTimes {
            prayers,
            jummah: crate::calculator::JummahDisplay {
                azan: None,
                khutbah: None,
                jamaat: None,
            },
            iftari: None,
            sehri_end: None,
            chasht: None,
            zohwa_kubra_start: None,
            zohwa_kubra_end: None,
            warnings: vec![],
            needs_persist: false,
            updated_raw: Default::default(),
        }
    }

    #[test]
    fn day_script_covers_full_day_without_gaps() {
        let display = display_with(&[("fajr", "05:00"), ("dhuhr", "12:30"), ("asr", "16:00"), ("maghrib", "19:00"), ("isha", "20:30")]);
        let intervals = day_script(0, &display, false);
        assert_eq!(intervals.first().unwrap().start_offset_secs, 0);
        assert_eq!(intervals.last().unwrap().end_offset_secs, 86_400);
        for pair in intervals.windows(2) {
            assert_eq!(pair[0].end_offset_secs, pair[1].start_offset_secs, "gap between intervals");
        }
    }

    #[test]
    fn tight_back_to_back_jamaats_stay_non_overlapping() {
        // Maghrib's post-jamaat window (600s) would normally run past
        // Isha's jamaat five minutes later; intervals must still be
        // ordered and non-overlapping rather than Isha starting "in the
        // past" relative to Maghrib's close-out.
        let display = display_with(&[("maghrib", "19:00"), ("isha", "19:05")]);
        let intervals = day_script(0, &display, false);
        for pair in intervals.windows(2) {
            assert!(pair[0].end_offset_secs <= pair[1].start_offset_secs, "overlap between intervals");
            assert!(pair[0].start_offset_secs <= pair[1].start_offset_secs, "intervals out of start order");
        }
    }

    #[test]
    fn friday_dhuhr_is_replaced_by_jummah() {
        let mut display = display_with(&[("fajr", "05:00"), ("asr", "16:00"), ("maghrib", "19:00"), ("isha", "20:30")]);
        display.jummah.jamaat = ClockTime::parse("13:00").ok();
        let intervals = day_script(0, &display, true);
        assert!(intervals.iter().any(|i| i.kind == IntervalKind::Jummah));
        assert!(!intervals.iter().any(|i| i.prayer == "dhuhr"));
    }
}
