use crate::adapters::GeocodingAdapter;
use crate::calendar::CalendarService;
use crate::config::EngineConfig;
use crate::dispatch::Dispatcher;
use crate::invalidation::SettingsHook;
use crate::metrics::EngineMetrics;
use crate::repo::{OwnerRepo, SettingsRepo};
use crate::schedule::ScheduleMaterializer;
use crate::zone::ZoneResolver;
use std::sync::Arc;

/// Everything a handler needs, wired once at startup and shared behind an
/// `Arc`. No handler re-reads configuration or re-opens a connection.
pub struct EngineState {
    pub config: Arc<EngineConfig>,
    pub metrics: Arc<EngineMetrics>,
    pub calendar: Arc<CalendarService>,
    pub zone_resolver: Arc<ZoneResolver>,
    pub schedule: Arc<ScheduleMaterializer>,
    pub settings_hook: Arc<SettingsHook>,
    pub settings_repo: Arc<dyn SettingsRepo>,
    pub owner_repo: Arc<dyn OwnerRepo>,
    pub geocoder: Arc<dyn GeocodingAdapter>,
    pub dispatcher: Arc<dyn Dispatcher>,
}
