//! Background workers (Component G): the two rolling-wave daily jobs plus
//! yearly cleanup and the December grace-period pre-fetch. Driven by a
//! `tokio::time::interval` ticker, the same idiom the original desktop
//! ticker used for its once-a-second prayer check, just at day
//! granularity.

use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, Job};
use crate::domain::MethodKey;
use crate::metrics::EngineMetrics;
use crate::repo::{CalendarRepo, ScheduleRepo, SettingsRepo};
use chrono::{Datelike, NaiveDate, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tracing::{error, info, instrument};

pub struct BackgroundWorkers {
    calendars: Arc<dyn CalendarRepo>,
    schedules: Arc<dyn ScheduleRepo>,
    settings: Arc<dyn SettingsRepo>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<EngineConfig>,
    metrics: Arc<EngineMetrics>,
}

impl BackgroundWorkers {
    pub fn new(
        calendars: Arc<dyn CalendarRepo>,
        schedules: Arc<dyn ScheduleRepo>,
        settings: Arc<dyn SettingsRepo>,
        dispatcher: Arc<dyn Dispatcher>,
        config: Arc<EngineConfig>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        BackgroundWorkers {
            calendars,
            schedules,
            settings,
            dispatcher,
            config,
            metrics,
        }
    }

    /// Spawns the daily tick loop that runs the rolling-wave jobs once per
    /// calendar day. Intended to be called once at process startup.
    pub fn spawn_daily_ticker(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(60 * 60));
            let mut last_run_date: Option<NaiveDate> = None;

            loop {
                ticker.tick().await;
                let today = Utc::now().date_naive();
                if last_run_date == Some(today) {
                    continue;
                }
                last_run_date = Some(today);

                if let Err(e) = self.proactive_yearly_calendar_fetcher(today).await {
                    error!(error = %e, "proactive_yearly_calendar_fetcher failed");
                }
                if let Err(e) = self.master_schedule_generator(today).await {
                    error!(error = %e, "master_schedule_generator failed");
                }
                if today.month() == self.config.cache_cleanup_month && today.day() == self.config.cache_cleanup_day {
                    if let Err(e) = self.cleanup_old_calendars(today).await {
                        error!(error = %e, "cleanup_old_calendars failed");
                    }
                }
            }
        });
    }

    /// Rolling wave over distinct `(zone_id, method_key)` pairs: each pair
    /// is processed on exactly one day of the year, selected by
    /// `SHA256(zone||"-"||method) mod D == day_of_year mod D`.
    #[instrument(skip(self))]
    pub async fn proactive_yearly_calendar_fetcher(&self, today: NaiveDate) -> Result<(), crate::error::EngineError> {
        let task_name = "proactive_yearly_calendar_fetcher";
        let timer = self.metrics.bg_task_duration_seconds.with_label_values(&[task_name]).start_timer();
        let days_in_year = if is_leap(today.year()) { 366 } else { 365 };
        let day_of_year = today.ordinal() as u64;
        let grace_active = is_on_or_after(today, self.config.cache_grace_period_start_month, self.config.cache_grace_period_start_day);

        let pairs = self.calendars.list_zone_method_pairs().await?;
        let mut enqueued = 0u32;

        for (zone_id, method_key) in pairs {
            let h = hash_bucket(&zone_id, &method_key);
            let selected_today = h % days_in_year == day_of_year % days_in_year;
            if !selected_today && !grace_active {
                continue;
            }

            let next_year = today.year() + 1;
            if self
                .calendars
                .get(&zone_id, next_year, &method_key)
                .await?
                .is_some()
            {
                continue;
            }
            let Some((lat, lon)) = recover_coordinates(&zone_id) else {
                continue;
            };
            self.dispatcher
                .delay(Job::FetchYearlyCalendar {
                    zone_id,
                    year: next_year,
                    method_key,
                    lat,
                    lon,
                })
                .await;
            enqueued += 1;
        }

        timer.observe_duration();
        self.metrics.bg_task_runs.with_label_values(&[task_name, "success"]).inc();
        info!(enqueued, "proactive yearly fetch wave complete");
        Ok(())
    }

    /// Rolling wave over owners: each owner is processed on exactly one day
    /// of the `SCHEDULE_GENERATION_DAYS`-day window, selected by
    /// `owner_id mod B == (day_of_month - 1) mod B`.
    #[instrument(skip(self))]
    pub async fn master_schedule_generator(&self, today: NaiveDate) -> Result<(), crate::error::EngineError> {
        let task_name = "master_schedule_generator";
        let timer = self.metrics.bg_task_duration_seconds.with_label_values(&[task_name]).start_timer();
        let b = self.config.schedule_generation_days as i64;
        let bucket = (today.day() as i64 - 1).rem_euclid(b);

        let next_month_first = first_of_next_month(today);
        let target_year = next_month_first.year();
        let target_month = next_month_first.month();

        let already_scheduled: std::collections::HashSet<_> = self
            .schedules
            .owners_with_schedule(target_year, target_month)
            .await?
            .into_iter()
            .collect();

        let all_owners = self.settings.all_owner_ids().await?;
        let mut dispatched = 0u32;
        for owner_id in all_owners {
            if owner_id.rem_euclid(b) != bucket || already_scheduled.contains(&owner_id) {
                continue;
            }
            self.dispatcher
                .delay(Job::GenerateSchedule {
                    owner_id,
                    year: target_year,
                    month: target_month,
                })
                .await;
            dispatched += 1;
        }

        timer.observe_duration();
        self.metrics.bg_task_runs.with_label_values(&[task_name, "success"]).inc();
        info!(dispatched, bucket, "master schedule generation wave complete");
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn cleanup_old_calendars(&self, today: NaiveDate) -> Result<(), crate::error::EngineError> {
        let deleted = self.calendars.delete_years_before(today.year()).await?;
        self.metrics
            .bg_task_runs
            .with_label_values(&["cleanup_old_calendars", "success"])
            .inc();
        info!(deleted, "pruned stale yearly calendars");
        Ok(())
    }
}

fn hash_bucket(zone_id: &str, method_key: &MethodKey) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(zone_id.as_bytes());
    hasher.update(b"-");
    hasher.update(method_key.as_str().as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[0..8]);
    u64::from_be_bytes(bytes)
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn is_on_or_after(date: NaiveDate, month: u32, day: u32) -> bool {
    (date.month(), date.day()) >= (month, day)
}

fn first_of_next_month(today: NaiveDate) -> NaiveDate {
    let (year, month) = if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid date")
}

/// Grid zone ids encode their own coordinates; administrative zone ids
/// need a representative point from an existing calendar, which callers
/// recover separately. Only the grid case is handled here.
fn recover_coordinates(zone_id: &str) -> Option<(f64, f64)> {
    let rest = zone_id.strip_prefix("grid:")?;
    let (lat_str, lon_str) = rest.split_once('/')?;
    Some((lat_str.parse().ok()?, lon_str.parse().ok()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_of_next_month_rolls_over_year() {
        let today = NaiveDate::from_ymd_opt(2025, 12, 20).unwrap();
        let next = first_of_next_month(today);
        assert_eq!(next.year(), 2026);
        assert_eq!(next.month(), 1);
        assert_eq!(next.day(), 1);
    }

    #[test]
    fn first_of_next_month_lands_on_the_first_for_a_30_day_month() {
        let today = NaiveDate::from_ymd_opt(2025, 11, 5).unwrap();
        let next = first_of_next_month(today);
        assert_eq!(next, NaiveDate::from_ymd_opt(2025, 12, 1).unwrap());
    }

    #[test]
    fn recovers_grid_coordinates() {
        assert_eq!(recover_coordinates("grid:28.60/77.20"), Some((28.60, 77.20)));
        assert_eq!(recover_coordinates("adm2:IN/DL/NewDelhi"), None);
    }

    #[test]
    fn hash_bucket_is_deterministic() {
        let mk = MethodKey::new(3, 0, 1);
        assert_eq!(hash_bucket("grid:1.0/1.0", &mk), hash_bucket("grid:1.0/1.0", &mk));
    }
}
