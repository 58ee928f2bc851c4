use super::state::EngineState;
use crate::domain::{OwnerSettings, Prayer};
use crate::error::EngineError;
use crate::invalidation::SettingsChangeKind;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Datelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct InitialQuery {
    pub lat: f64,
    pub lon: f64,
    pub method: String,
    pub owner_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PrayerBlock {
    pub azan: Option<String>,
    pub jamaat: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DateInfo {
    gregorian: String,
    hijri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct InitialResponse {
    current_location_name: String,
    date_info: DateInfo,
    prayer_times: std::collections::BTreeMap<String, PrayerBlock>,
    jummah: serde_json::Value,
    chasht: Option<String>,
    iftari: Option<String>,
    sehri_end: Option<String>,
    zohwa_kubra: serde_json::Value,
    warnings: Vec<String>,
}

/// Renders the Hijri calendar date for display, shifted by the owner's
/// `hijri_offset_days` (moonsighting lag correction).
fn hijri_date_display(gregorian: chrono::NaiveDate, offset_days: i32) -> Option<String> {
    let shifted = gregorian + chrono::Duration::days(offset_days as i64);
    let hijri = hijri_date::HijriDate::from_gr(shifted.year() as usize, shifted.month() as usize, shifted.day() as usize).ok()?;
    Some(format!("{} {} {}", hijri.day(), hijri.month_name(), hijri.year()))
}

pub async fn get_prayer_initial(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<InitialQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let settings = state
        .settings_repo
        .get(query.owner_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("owner {} has no settings", query.owner_id)))?;

    let today = Utc::now().date_naive();
    let tomorrow = today + chrono::Duration::days(1);

    let zone_id = state
        .zone_resolver
        .resolve_zone(query.lat, query.lon, &settings.method_key, today.year())
        .await?;

    let today_raw = state
        .calendar
        .get_daily(&zone_id, today, query.lat, query.lon, &settings.method_key)
        .await?;
    let tomorrow_raw = state
        .calendar
        .get_daily(&zone_id, tomorrow, query.lat, query.lon, &settings.method_key)
        .await
        .unwrap_or_default();

    let last_raw = state
        .settings_repo
        .get_last_raw_times(query.owner_id)
        .await?
        .unwrap_or_default();
    let is_friday = today.weekday() == Weekday::Fri;

    let display = crate::calculator::calculate_display_times(&settings, &today_raw, &tomorrow_raw, &last_raw, is_friday);
    if display.needs_persist {
        state
            .settings_repo
            .put_last_raw_times(query.owner_id, display.updated_raw.clone())
            .await?;
    }

    let mut prayer_times = std::collections::BTreeMap::new();
    for prayer in Prayer::DAILY_SEQUENCE.iter() {
        if let Some(p) = display.prayers.get(prayer.key()) {
            prayer_times.insert(
                prayer.key().to_string(),
                PrayerBlock {
                    azan: p.azan.map(|t| t.format_hm()),
                    jamaat: p.jamaat.map(|t| t.format_hm()),
                },
            );
        }
    }

    let date_info = DateInfo {
        gregorian: today.format("%Y-%m-%d").to_string(),
        hijri: hijri_date_display(today, settings.hijri_offset_days),
    };

    let response = InitialResponse {
        current_location_name: zone_id,
        date_info,
        prayer_times,
        jummah: json!({
            "azan": display.jummah.azan.map(|t| t.format_hm()),
            "khutbah": display.jummah.khutbah.map(|t| t.format_hm()),
            "jamaat": display.jummah.jamaat.map(|t| t.format_hm()),
        }),
        chasht: display.chasht.map(|t| t.format_hm()),
        iftari: display.iftari.map(|t| t.format_hm()),
        sehri_end: display.sehri_end.map(|t| t.format_hm()),
        zohwa_kubra: json!({
            "start": display.zohwa_kubra_start.map(|t| t.format_hm()),
            "end": display.zohwa_kubra_end.map(|t| t.format_hm()),
        }),
        warnings: display.warnings,
    };

    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
pub struct MonthlyQuery {
    pub owner_id: i64,
    pub year: i32,
    pub month: u32,
}

pub async fn get_schedule_monthly(
    State(state): State<Arc<EngineState>>,
    Query(query): Query<MonthlyQuery>,
) -> Result<impl IntoResponse, EngineError> {
    let schedule = state
        .schedule
        .get_or_generate_monthly(query.owner_id, query.year, query.month, false)
        .await?;
    Ok(Json(schedule))
}

#[derive(Debug, Deserialize)]
pub struct GuestFollowRequest {
    pub device_owner_id: i64,
    pub masjid_id: i64,
}

pub async fn post_guest_follow(
    State(state): State<Arc<EngineState>>,
    Json(req): Json<GuestFollowRequest>,
) -> Result<impl IntoResponse, EngineError> {
    state.owner_repo.set_follow(req.device_owner_id, req.masjid_id).await?;
    Ok((StatusCode::OK, Json(json!({ "ok": true }))))
}

#[derive(Debug, Deserialize)]
pub struct SettingsChangeRequest {
    pub settings: OwnerSettings,
    pub change_kind: ChangeKindWire,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKindWire {
    PrayerRules,
    DisplayPreferenceOnly,
}

pub async fn post_owner_settings(
    State(state): State<Arc<EngineState>>,
    Json(req): Json<SettingsChangeRequest>,
) -> Result<impl IntoResponse, EngineError> {
    let owner_id = req.settings.owner_id;
    let kind = match req.change_kind {
        ChangeKindWire::PrayerRules => SettingsChangeKind::PrayerRules,
        ChangeKindWire::DisplayPreferenceOnly => SettingsChangeKind::DisplayPreferenceOnly,
    };
    state.settings_hook.apply_settings_change(owner_id, req.settings, kind).await?;
    Ok((StatusCode::OK, Json(json!({ "ok": true }))))
}

pub async fn get_metrics(State(state): State<Arc<EngineState>>) -> impl IntoResponse {
    state.metrics.render()
}

pub async fn get_healthz(State(_state): State<Arc<EngineState>>) -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}
