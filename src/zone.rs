//! Zone resolver (Component C): collapses a coordinate onto a canonical
//! zone id shared by every request in that area, and picks a concrete
//! calculation method when the caller asked for `AUTOMATIC`.

use crate::adapters::GeocodingAdapter;
use crate::config::EngineConfig;
use crate::domain::{DailyTimings, MethodKey, Prayer, ZoneAlias};
use crate::error::EngineError;
use crate::repo::{AliasRepo, CalendarRepo};
use crate::time::ClockTime;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
struct CountryMethodMap {
    #[serde(default = "default_method")]
    default_method_id: i64,
    #[serde(default)]
    country_map: HashMap<String, i64>,
}

fn default_method() -> i64 {
    3
}

/// Resolves `AUTOMATIC` to a concrete calculation method id for the given
/// country, falling back to the map's `default_method_id` (3 when the map
/// itself is absent), mirroring the original `get_method_id_for_country`'s
/// `{"country_map": {...}, "default_method_id": ...}` file shape.
pub fn resolve_automatic_method(map_json: Option<&str>, country_code: &str) -> i64 {
    let map: CountryMethodMap = match map_json.and_then(|s| serde_json::from_str(s).ok()) {
        Some(m) => m,
        None => {
            return default_method();
        }
    };
    *map.country_map.get(country_code).unwrap_or(&map.default_method_id)
}

pub struct ZoneResolver {
    geocoder: Arc<dyn GeocodingAdapter>,
    calendars: Arc<dyn CalendarRepo>,
    aliases: Arc<dyn AliasRepo>,
    config: Arc<EngineConfig>,
    country_method_map_json: Option<String>,
}

impl ZoneResolver {
    pub fn new(
        geocoder: Arc<dyn GeocodingAdapter>,
        calendars: Arc<dyn CalendarRepo>,
        aliases: Arc<dyn AliasRepo>,
        config: Arc<EngineConfig>,
        country_method_map_json: Option<String>,
    ) -> Self {
        ZoneResolver {
            geocoder,
            calendars,
            aliases,
            config,
            country_method_map_json,
        }
    }

    pub fn grid_zone_id(&self, lat: f64, lon: f64) -> String {
        let g = self.config.zone_grid_size_deg;
        let lat_q = (lat / g).floor() * g;
        let lon_q = (lon / g).floor() * g;
        format!("grid:{lat_q:.2}/{lon_q:.2}")
    }

    /// Resolves `method_id` to a concrete id, consulting the country
    /// method map when the caller passed the `AUTOMATIC` sentinel.
    pub async fn resolve_method_id(
        &self,
        method_id: &str,
        lat: f64,
        lon: f64,
    ) -> Result<i64, EngineError> {
        if method_id != self.config.automatic_method_sentinel {
            return method_id
                .parse()
                .map_err(|_| EngineError::Permanent(format!("invalid method id {method_id:?}")));
        }
        let country = match self.geocoder.reverse(lat, lon).await? {
            Some(rg) => rg.country_code,
            None => return Ok(resolve_automatic_method(self.country_method_map_json.as_deref(), "")),
        };
        Ok(resolve_automatic_method(
            self.country_method_map_json.as_deref(),
            &country,
        ))
    }

    /// Determines the canonical zone id to cache and read calendars under,
    /// per the Admin-2 vs Admin-3 comparison algorithm.
    pub async fn resolve_zone(
        &self,
        lat: f64,
        lon: f64,
        method_key: &MethodKey,
        year: i32,
    ) -> Result<String, EngineError> {
        let rg = match self.geocoder.reverse(lat, lon).await? {
            Some(rg) => rg,
            None => return Ok(self.grid_zone_id(lat, lon)),
        };

        let adm2 = match &rg.adm2 {
            Some(a) => a,
            None => return Ok(self.grid_zone_id(lat, lon)),
        };
        let z2 = format!("adm2:{}/{}/{}", rg.country_code, rg.adm1.as_deref().unwrap_or(""), adm2);

        let adm3 = match &rg.adm3 {
            Some(a) => a,
            None => return Ok(z2),
        };
        let z3 = format!("{z2}/{adm3}").replacen("adm2:", "adm3:", 1);

        if let Some(alias) = self.aliases.get(&z3, method_key).await? {
            return Ok(alias.target_zone_id);
        }

        let cal2 = self.calendars.get(&z2, year, method_key).await?;
        let cal3 = self.calendars.get(&z3, year, method_key).await?;
        let (cal2, cal3) = match (cal2, cal3) {
            (Some(a), Some(b)) => (a, b),
            _ => return Ok(z3),
        };

        if zones_differ(&cal2.days, &cal3.days, self.config.time_diff_threshold_seconds) {
            Ok(z3)
        } else {
            self.aliases
                .put(ZoneAlias {
                    source_zone_id: z3.clone(),
                    target_zone_id: z2.clone(),
                    method_key: method_key.clone(),
                })
                .await?;
            Ok(z2)
        }
    }
}

/// Two zones differ if any of the five daily prayers differs by more than
/// `threshold_seconds` on any shared day.
fn zones_differ(a: &[DailyTimings], b: &[DailyTimings], threshold_seconds: u32) -> bool {
    for (day_a, day_b) in a.iter().zip(b.iter()) {
        for prayer in Prayer::DAILY_SEQUENCE.iter() {
            let (Some(ta), Some(tb)) = (day_a.get(prayer), day_b.get(prayer)) else {
                continue;
            };
            let (Ok(ta), Ok(tb)) = (ClockTime::parse(ta), ClockTime::parse(tb)) else {
                continue;
            };
            if ta.wrap_abs_diff_seconds(&tb) > threshold_seconds {
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::geocoding::{GeocodeHit, ReverseGeocode};
    use crate::cache::memory::{InMemoryAliasRepo, InMemoryCalendarRepo};
    use async_trait::async_trait;

    fn day(fajr: &str, dhuhr: &str) -> DailyTimings {
        let mut timings = std::collections::BTreeMap::new();
        timings.insert("fajr".to_string(), fajr.to_string());
        timings.insert("dhuhr".to_string(), dhuhr.to_string());
        DailyTimings { timings }
    }

    #[test]
    fn identical_zones_within_threshold() {
        let a = vec![day("05:00", "12:30")];
        let b = vec![day("05:00:20", "12:30:10")];
        assert!(!zones_differ(&a, &b, 50));
    }

    #[test]
    fn zones_differ_past_threshold() {
        let a = vec![day("05:00", "12:30")];
        let b = vec![day("05:02", "12:30")];
        assert!(zones_differ(&a, &b, 50));
    }

    #[test]
    fn automatic_method_falls_back_to_default() {
        assert_eq!(resolve_automatic_method(None, "IN"), 3);
    }

    #[test]
    fn automatic_method_uses_country_map() {
        let map = r#"{"default_method_id": 3, "country_map": {"IN": 1, "SA": 4}}"#;
        assert_eq!(resolve_automatic_method(Some(map), "IN"), 1);
        assert_eq!(resolve_automatic_method(Some(map), "US"), 3);
    }

    struct FakeGeocoder(ReverseGeocode);

    #[async_trait]
    impl GeocodingAdapter for FakeGeocoder {
        async fn geocode(&self, _city: &str) -> Result<Option<GeocodeHit>, EngineError> {
            Ok(None)
        }
        async fn reverse(&self, _lat: f64, _lon: f64) -> Result<Option<ReverseGeocode>, EngineError> {
            Ok(Some(self.0.clone()))
        }
        async fn autocomplete(&self, _prefix: &str) -> Result<Vec<String>, EngineError> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn resolve_zone_follows_an_existing_alias_without_refetching_calendars() {
        let geocoder = Arc::new(FakeGeocoder(ReverseGeocode {
            country_code: "IN".to_string(),
            adm1: Some("DL".to_string()),
            adm2: Some("Central".to_string()),
            adm3: Some("Karol Bagh".to_string()),
        }));
        let calendars = Arc::new(InMemoryCalendarRepo::default());
        let aliases = Arc::new(InMemoryAliasRepo::default());
        let method_key = MethodKey::new(3, 0, 1);
        let z3 = "adm3:IN/DL/Central/Karol Bagh".to_string();
        let z2 = "adm2:IN/DL/Central".to_string();
        aliases
            .put(ZoneAlias {
                source_zone_id: z3.clone(),
                target_zone_id: z2.clone(),
                method_key: method_key.clone(),
            })
            .await
            .unwrap();

        let resolver = ZoneResolver::new(
            geocoder,
            calendars.clone(),
            aliases,
            Arc::new(EngineConfig::default()),
            None,
        );

        let resolved = resolver.resolve_zone(28.6, 77.2, &method_key, 2025).await.unwrap();
        assert_eq!(resolved, z2);
        // No calendar lookups should have been necessary to follow the alias.
        assert!(calendars.list_zone_method_pairs().await.unwrap().is_empty());
    }
}
