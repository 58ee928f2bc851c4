//! Calendar cache orchestration (Component D): hot tier, cold tier,
//! single-flight locked fetch, and the today-only synchronous fallback.

use crate::adapters::prayer_time::PrayerTimeAdapter;
use crate::adapters::{retry_transient, with_deadline};
use crate::config::EngineConfig;
use crate::dispatch::{Dispatcher, Job};
use crate::domain::{DailyTimings, MethodKey, YearlyCalendar};
use crate::error::EngineError;
use crate::metrics::EngineMetrics;
use crate::repo::{CalendarRepo, HotCache};
use chrono::{Datelike, NaiveDate};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

pub struct CalendarService {
    hot: Arc<dyn HotCache>,
    cold: Arc<dyn CalendarRepo>,
    adapter: Arc<dyn PrayerTimeAdapter>,
    dispatcher: Arc<dyn Dispatcher>,
    config: Arc<EngineConfig>,
    metrics: Arc<EngineMetrics>,
}

impl CalendarService {
    pub fn new(
        hot: Arc<dyn HotCache>,
        cold: Arc<dyn CalendarRepo>,
        adapter: Arc<dyn PrayerTimeAdapter>,
        dispatcher: Arc<dyn Dispatcher>,
        config: Arc<EngineConfig>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        CalendarService {
            hot,
            cold,
            adapter,
            dispatcher,
            config,
            metrics,
        }
    }

    fn lock_key(zone_id: &str, year: i32, method_key: &MethodKey) -> String {
        format!("lock:calendar_fetch:{zone_id}:{year}:{}", method_key.as_str())
    }

    fn daily_key(&self, zone_id: &str, date: NaiveDate, method_key: &MethodKey) -> String {
        format!(
            "daily:{}:{zone_id}:{date}:{}",
            self.config.cache_schema_version,
            method_key.as_str()
        )
    }

    /// Returns today's raw timings for `(zone_id, lat, lon, method_key)`,
    /// preferring the cached yearly calendar and falling back to the
    /// single-flight-protected synchronous path on a full miss.
    #[instrument(skip(self), fields(zone_id, year = date.year()))]
    pub async fn get_daily(
        &self,
        zone_id: &str,
        date: NaiveDate,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<DailyTimings, EngineError> {
        let year = date.year();
        if let Some(calendar) = self.get_yearly_cached(zone_id, year, method_key).await? {
            let idx = date.ordinal0() as usize;
            if let Some(day) = calendar.days.get(idx) {
                self.metrics
                    .cache_hits
                    .with_label_values(&["yearly", zone_id, &year.to_string()])
                    .inc();
                return Ok(day.clone());
            }
        }
        self.metrics
            .cache_misses
            .with_label_values(&["yearly", zone_id, &year.to_string()])
            .inc();
        self.get_daily_fallback(zone_id, date, lat, lon, method_key).await
    }

    /// Hot-then-cold read of a complete yearly calendar, backfilling hot on
    /// a cold hit.
    pub async fn get_yearly_cached(
        &self,
        zone_id: &str,
        year: i32,
        method_key: &MethodKey,
    ) -> Result<Option<YearlyCalendar>, EngineError> {
        let key = YearlyCalendar::cache_key(&self.config.cache_schema_version, zone_id, year, method_key);
        if let Some(raw) = self.hot.get(&key).await? {
            if let Ok(cal) = serde_json::from_str::<YearlyCalendar>(&raw) {
                return Ok(Some(cal));
            }
        }
        let cold = self.cold.get(zone_id, year, method_key).await?;
        if let Some(cal) = &cold {
            let ttl = Duration::from_secs(self.config.redis_ttl_yearly_calendar_secs);
            if let Ok(raw) = serde_json::to_string(cal) {
                self.hot.set(&key, raw, ttl).await?;
            }
        }
        Ok(cold)
    }

    /// The today-only synchronous fallback used on a complete cache miss.
    /// The first caller to observe the miss claims the fetch lock and
    /// enqueues a full yearly backfill; every caller fetches and caches
    /// just today's entry.
    async fn get_daily_fallback(
        &self,
        zone_id: &str,
        date: NaiveDate,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<DailyTimings, EngineError> {
        let daily_key = self.daily_key(zone_id, date, method_key);
        if let Some(raw) = self.hot.get(&daily_key).await? {
            if let Ok(day) = serde_json::from_str::<DailyTimings>(&raw) {
                return Ok(day);
            }
        }

        let lock_key = Self::lock_key(zone_id, date.year(), method_key);
        let claimed = self
            .hot
            .set_if_absent(&lock_key, Duration::from_secs(self.config.lock_lease_seconds))
            .await?;
        if claimed {
            info!(zone_id, year = date.year(), "claimed single-flight lock, enqueuing yearly fetch");
            self.dispatcher
                .delay(Job::FetchYearlyCalendar {
                    zone_id: zone_id.to_string(),
                    year: date.year(),
                    method_key: method_key.clone(),
                    lat,
                    lon,
                })
                .await;
        }

        let timer = self
            .metrics
            .api_request_duration_seconds
            .with_label_values(&["prayer_time", "fetch_daily"])
            .start_timer();
        let deadline = Duration::from_millis(self.config.request_deadline_ms);
        let result = with_deadline(deadline, retry_transient(|| self.adapter.fetch_daily(date, lat, lon, method_key))).await;
        timer.observe_duration();
        self.metrics
            .api_requests
            .with_label_values(&["prayer_time", "fetch_daily", if result.is_ok() { "success" } else { "failure" }])
            .inc();
        let day = result?;
        let ttl = Duration::from_secs(self.config.redis_ttl_daily_cache_secs);
        if let Ok(raw) = serde_json::to_string(&day) {
            self.hot.set(&daily_key, raw, ttl).await?;
        }
        Ok(day)
    }

    /// Fetches a full year from the adapter and upserts the cold tier,
    /// skipping the write when the content hash is unchanged (only
    /// `updated_at` moves, via `upsert`'s idempotence).
    #[instrument(skip(self, lat, lon))]
    pub async fn fetch_and_cache_yearly(
        &self,
        zone_id: &str,
        year: i32,
        method_key: &MethodKey,
        lat: f64,
        lon: f64,
    ) -> Result<(), EngineError> {
        let timer = self
            .metrics
            .api_request_duration_seconds
            .with_label_values(&["prayer_time", "fetch_yearly"])
            .start_timer();
        let deadline = Duration::from_millis(self.config.request_deadline_ms);
        let result = with_deadline(deadline, retry_transient(|| self.adapter.fetch_yearly(year, lat, lon, method_key))).await;
        timer.observe_duration();
        self.metrics
            .api_requests
            .with_label_values(&["prayer_time", "fetch_yearly", if result.is_ok() { "success" } else { "failure" }])
            .inc();
        let days = result?;
        let content_hash = hash_days(&days);

        let now = now_unix();
        let existing = self.cold.get(zone_id, year, method_key).await?;
        if let Some(existing) = &existing {
            if existing.content_hash == content_hash {
                warn!(zone_id, year, "yearly calendar unchanged, skipping write");
                return Ok(());
            }
        }

        let calendar = YearlyCalendar {
            zone_id: zone_id.to_string(),
            year,
            method_key: method_key.clone(),
            schema_version: self.config.cache_schema_version.clone(),
            days,
            content_hash,
            created_at: existing.as_ref().map(|c| c.created_at).unwrap_or(now),
            updated_at: now,
        };
        self.cold.upsert(calendar.clone()).await?;

        let key = YearlyCalendar::cache_key(&self.config.cache_schema_version, zone_id, year, method_key);
        let ttl = Duration::from_secs(self.config.redis_ttl_yearly_calendar_secs);
        if let Ok(raw) = serde_json::to_string(&calendar) {
            self.hot.set(&key, raw, ttl).await?;
        }
        Ok(())
    }
}

fn hash_days(days: &[DailyTimings]) -> String {
    let canonical = serde_json::to_string(days).unwrap_or_default();
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
    use crate::cache::memory::InMemoryCalendarRepo;
    use crate::cache::InMemoryHotCache;
    use crate::dispatch::VecDispatcher;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FakeAdapter {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PrayerTimeAdapter for FakeAdapter {
        async fn fetch_daily(
            &self,
            _date: NaiveDate,
            _lat: f64,
            _lon: f64,
            _method_key: &MethodKey,
        ) -> Result<DailyTimings, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut timings = std::collections::BTreeMap::new();
            timings.insert("fajr".to_string(), "05:00".to_string());
            Ok(DailyTimings { timings })
        }

        async fn fetch_yearly(
            &self,
            year: i32,
            _lat: f64,
            _lon: f64,
            _method_key: &MethodKey,
        ) -> Result<Vec<DailyTimings>, EngineError> {
            let days_in_year = if year % 4 == 0 { 366 } else { 365 };
            Ok(vec![DailyTimings::default(); days_in_year])
        }
    }

    fn service(adapter: Arc<FakeAdapter>) -> (CalendarService, Arc<VecDispatcher>) {
        let dispatcher = Arc::new(VecDispatcher::new());
        let service = CalendarService::new(
            Arc::new(InMemoryHotCache::new()),
            Arc::new(InMemoryCalendarRepo::default()),
            adapter,
            dispatcher.clone(),
            Arc::new(EngineConfig::default()),
            Arc::new(EngineMetrics::new()),
        );
        (service, dispatcher)
    }

    #[tokio::test]
    async fn single_flight_enqueues_once_and_falls_back_to_daily() {
        let adapter = Arc::new(FakeAdapter { calls: AtomicU32::new(0) });
        let (service, dispatcher) = service(adapter.clone());
        let method_key = MethodKey::new(3, 0, 1);
        let date = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();

        let first = service.get_daily("grid:1.0/1.0", date, 1.0, 1.0, &method_key).await.unwrap();
        assert_eq!(first.get(&crate::domain::Prayer::Fajr), Some("05:00"));
        assert_eq!(dispatcher.jobs().len(), 1);

        service.get_daily("grid:1.0/1.0", date, 1.0, 1.0, &method_key).await.unwrap();
        assert_eq!(dispatcher.jobs().len(), 1, "second caller must not re-enqueue");
        assert_eq!(adapter.calls.load(Ordering::SeqCst), 2, "both callers do a synchronous daily fetch");
    }

    #[tokio::test]
    async fn unchanged_yearly_calendar_skips_cold_write() {
        let adapter = Arc::new(FakeAdapter { calls: AtomicU32::new(0) });
        let (service, _dispatcher) = service(adapter);
        let method_key = MethodKey::new(3, 0, 1);

        service
            .fetch_and_cache_yearly("grid:1.0/1.0", 2025, &method_key, 1.0, 1.0)
            .await
            .unwrap();
        let first = service.get_yearly_cached("grid:1.0/1.0", 2025, &method_key).await.unwrap().unwrap();

        service
            .fetch_and_cache_yearly("grid:1.0/1.0", 2025, &method_key, 1.0, 1.0)
            .await
            .unwrap();
        let second = service.get_yearly_cached("grid:1.0/1.0", 2025, &method_key).await.unwrap().unwrap();

        assert_eq!(first.updated_at, second.updated_at);
    }
}
