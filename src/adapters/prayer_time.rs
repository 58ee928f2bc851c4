use crate::domain::{DailyTimings, MethodKey};
use crate::error::EngineError;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::time::Duration;

/// Port to an external astronomical prayer-time provider. Implementations
/// classify failures as transient (timeout, 5xx, 429, connection) or
/// permanent (bad params, other 4xx, malformed payload) so the caller's
/// retry policy (see [`crate::adapters::retry_transient`]) behaves
/// correctly.
#[async_trait]
pub trait PrayerTimeAdapter: Send + Sync {
    async fn fetch_daily(
        &self,
        date: NaiveDate,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<DailyTimings, EngineError>;

    async fn fetch_yearly(
        &self,
        year: i32,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<Vec<DailyTimings>, EngineError>;
}

/// HTTP adapter for an Aladhan-shaped prayer-times REST API, keyed by
/// lat/lon and a numeric calculation-method id.
pub struct HttpPrayerTimeAdapter {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPrayerTimeAdapter {
    /// `request_deadline_ms` bounds each individual HTTP call; the caller
    /// is still free to wrap the whole retrying fetch in a tighter overall
    /// deadline via [`crate::adapters::with_deadline`].
    pub fn new(base_url: impl Into<String>, request_deadline_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_deadline_ms))
            .build()
            .expect("reqwest client builds with a timeout");
        HttpPrayerTimeAdapter {
            client,
            base_url: base_url.into(),
        }
    }

    fn classify_status(status: reqwest::StatusCode, retry_after: Option<u64>) -> EngineError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let hint = retry_after.map(|s| format!(", retry after {s}s")).unwrap_or_default();
            return EngineError::transient_with_retry_after(format!("rate limited{hint}"), retry_after);
        }
        if status.is_server_error() {
            return EngineError::transient(format!("upstream {status}"));
        }
        EngineError::Permanent(format!("upstream {status}"))
    }
}

#[async_trait]
impl PrayerTimeAdapter for HttpPrayerTimeAdapter {
    async fn fetch_daily(
        &self,
        date: NaiveDate,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<DailyTimings, EngineError> {
        let url = format!(
            "{}/timings/{}?latitude={lat}&longitude={lon}&method={}",
            self.base_url,
            date.format("%d-%m-%Y"),
            method_key.as_str(),
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Self::classify_status(resp.status(), retry_after));
        }

        resp.json::<DailyTimings>()
            .await
            .map_err(|e| EngineError::Permanent(format!("malformed daily payload: {e}")))
    }

    async fn fetch_yearly(
        &self,
        year: i32,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
    ) -> Result<Vec<DailyTimings>, EngineError> {
        let url = format!(
            "{}/calendar/{year}?latitude={lat}&longitude={lon}&method={}&annual=true",
            self.base_url,
            method_key.as_str(),
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            return Err(Self::classify_status(resp.status(), retry_after));
        }

        let days: Vec<DailyTimings> = resp
            .json()
            .await
            .map_err(|e| EngineError::Permanent(format!("malformed yearly payload: {e}")))?;

        let expected = if is_leap_year(year) { 366 } else { 365 };
        if days.len() != expected {
            return Err(EngineError::Permanent(format!(
                "yearly payload has {} days, expected {expected}",
                days.len()
            )));
        }
        Ok(days)
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leap_year_rule() {
        assert!(is_leap_year(2024));
        assert!(!is_leap_year(2023));
        assert!(!is_leap_year(1900));
        assert!(is_leap_year(2000));
    }
}
