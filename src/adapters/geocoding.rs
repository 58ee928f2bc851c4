use crate::error::EngineError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ReverseGeocode {
    pub country_code: String,
    pub adm1: Option<String>,
    pub adm2: Option<String>,
    pub adm3: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeHit {
    pub lat: f64,
    pub lon: f64,
    pub country_code: String,
}

/// Port to an external geocoding provider (Component B). `reverse` backs
/// the zone resolver; `geocode`/`autocomplete` back user-facing city
/// search and are not otherwise used by the cache.
#[async_trait]
pub trait GeocodingAdapter: Send + Sync {
    async fn geocode(&self, city: &str) -> Result<Option<GeocodeHit>, EngineError>;
    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<ReverseGeocode>, EngineError>;
    async fn autocomplete(&self, prefix: &str) -> Result<Vec<String>, EngineError>;
}

pub struct HttpGeocodingAdapter {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpGeocodingAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, request_deadline_ms: u64) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_deadline_ms))
            .build()
            .expect("reqwest client builds with a timeout");
        HttpGeocodingAdapter {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn classify(status: reqwest::StatusCode) -> EngineError {
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            EngineError::transient(format!("geocoder {status}"))
        } else {
            EngineError::Permanent(format!("geocoder {status}"))
        }
    }
}

#[async_trait]
impl GeocodingAdapter for HttpGeocodingAdapter {
    async fn geocode(&self, city: &str) -> Result<Option<GeocodeHit>, EngineError> {
        let url = format!(
            "{}/search?q={}&key={}",
            self.base_url,
            urlencoding_lite(city),
            self.api_key
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("request failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::classify(resp.status()));
        }
        let hit = resp
            .json::<GeocodeHit>()
            .await
            .map_err(|e| EngineError::Permanent(format!("malformed geocode payload: {e}")))?;
        Ok(Some(hit))
    }

    async fn reverse(&self, lat: f64, lon: f64) -> Result<Option<ReverseGeocode>, EngineError> {
        let url = format!(
            "{}/reverse?lat={lat}&lon={lon}&key={}",
            self.base_url, self.api_key
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("request failed: {e}")))?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Self::classify(resp.status()));
        }
        let rg = resp
            .json::<ReverseGeocode>()
            .await
            .map_err(|e| EngineError::Permanent(format!("malformed reverse payload: {e}")))?;
        Ok(Some(rg))
    }

    async fn autocomplete(&self, prefix: &str) -> Result<Vec<String>, EngineError> {
        let url = format!(
            "{}/autocomplete?q={}&key={}",
            self.base_url,
            urlencoding_lite(prefix),
            self.api_key
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| EngineError::transient(format!("request failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(Self::classify(resp.status()));
        }
        resp.json::<Vec<String>>()
            .await
            .map_err(|e| EngineError::Permanent(format!("malformed autocomplete payload: {e}")))
    }
}

fn urlencoding_lite(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}
