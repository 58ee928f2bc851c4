//! Process-wide configuration, read once at startup and handed to every
//! component by reference. No component re-reads the environment after
//! this value is built.

use clap::Parser;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub zone_grid_size_deg: f64,
    pub time_diff_threshold_seconds: u32,
    pub cache_schema_version: String,
    pub redis_ttl_yearly_calendar_secs: u64,
    pub redis_ttl_daily_cache_secs: u64,
    pub cache_grace_period_start_month: u32,
    pub cache_grace_period_start_day: u32,
    pub cache_cleanup_month: u32,
    pub cache_cleanup_day: u32,
    pub schedule_generation_days: u32,
    pub automatic_method_sentinel: String,
    pub country_method_map_path: String,
    pub request_deadline_ms: u64,
    pub lock_lease_seconds: u64,
    pub worker_pool_size: usize,
    pub log_format: LogFormat,
    pub bind_addr: String,
    pub cold_store_path: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            zone_grid_size_deg: 0.2,
            time_diff_threshold_seconds: 50,
            cache_schema_version: "v1".to_string(),
            redis_ttl_yearly_calendar_secs: 60 * 60 * 24 * 400,
            redis_ttl_daily_cache_secs: 2 * 60 * 60,
            cache_grace_period_start_month: 12,
            cache_grace_period_start_day: 15,
            cache_cleanup_month: 1,
            cache_cleanup_day: 1,
            schedule_generation_days: 28,
            automatic_method_sentinel: "AUTOMATIC".to_string(),
            country_method_map_path: "config/country_method_map.json".to_string(),
            request_deadline_ms: 5_000,
            lock_lease_seconds: 600,
            worker_pool_size: 4,
            log_format: LogFormat::Pretty,
            bind_addr: "0.0.0.0:8080".to_string(),
            cold_store_path: "data/cold-store".to_string(),
        }
    }
}

/// Command-line / environment overlay on top of [`EngineConfig::default`].
/// Mirrors only the variables a deployer commonly tunes; anything else is
/// left at its coded default.
#[derive(Debug, Parser)]
#[command(name = "prayer-engine-server")]
pub struct CliArgs {
    #[arg(long, env = "BIND_ADDR")]
    pub bind_addr: Option<String>,

    #[arg(long, env = "COLD_STORE_PATH")]
    pub cold_store_path: Option<String>,

    #[arg(long, env = "LOG_FORMAT")]
    pub log_format: Option<String>,

    #[arg(long, env = "WORKER_POOL_SIZE")]
    pub worker_pool_size: Option<usize>,

    #[arg(long, env = "SCHEDULE_GENERATION_DAYS")]
    pub schedule_generation_days: Option<u32>,

    #[arg(long, env = "COUNTRY_METHOD_MAP_PATH")]
    pub country_method_map_path: Option<String>,

    #[arg(long, env = "REQUEST_DEADLINE_MS")]
    pub request_deadline_ms: Option<u64>,
}

impl EngineConfig {
    /// Builds the config from defaults, overlaid by CLI flags / env vars.
    /// Does not touch the environment again after this call returns.
    pub fn load(args: CliArgs) -> Self {
        let mut cfg = EngineConfig::default();
        if let Some(v) = args.bind_addr {
            cfg.bind_addr = v;
        }
        if let Some(v) = args.cold_store_path {
            cfg.cold_store_path = v;
        }
        if let Some(v) = args.worker_pool_size {
            cfg.worker_pool_size = v;
        }
        if let Some(v) = args.schedule_generation_days {
            cfg.schedule_generation_days = v;
        }
        if let Some(v) = args.country_method_map_path {
            cfg.country_method_map_path = v;
        }
        if let Some(v) = args.request_deadline_ms {
            cfg.request_deadline_ms = v;
        }
        if let Some(v) = args.log_format {
            cfg.log_format = match v.to_lowercase().as_str() {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }
        cfg
    }
}
