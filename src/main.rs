use clap::Parser;
use prayer_engine::adapters::prayer_time::HttpPrayerTimeAdapter;
use prayer_engine::adapters::geocoding::HttpGeocodingAdapter;
use prayer_engine::cache::{InMemoryHotCache, SledStore};
use prayer_engine::calendar::CalendarService;
use prayer_engine::config::{CliArgs, EngineConfig, LogFormat};
use prayer_engine::dispatch::{ChannelDispatcher, Dispatcher, Job};
use prayer_engine::http::{build_router, EngineState};
use prayer_engine::invalidation::SettingsHook;
use prayer_engine::metrics::EngineMetrics;
use prayer_engine::repo::CalendarRepo;
use prayer_engine::schedule::ScheduleMaterializer;
use prayer_engine::workers::BackgroundWorkers;
use prayer_engine::zone::ZoneResolver;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = Arc::new(EngineConfig::load(args));
    init_tracing(&config);

    let metrics = Arc::new(EngineMetrics::new());
    let cold_store = Arc::new(SledStore::open(&config.cold_store_path)?);
    let hot_cache = Arc::new(InMemoryHotCache::new());

    let prayer_adapter = Arc::new(HttpPrayerTimeAdapter::new(
        "https://api.aladhan.com/v1",
        config.request_deadline_ms,
    ));
    let geocoding_adapter = Arc::new(HttpGeocodingAdapter::new(
        "https://us1.locationiq.com/v1",
        std::env::var("LOCATIONIQ_API_KEY").unwrap_or_default(),
        config.request_deadline_ms,
    ));

    let country_method_map_json = std::fs::read_to_string(&config.country_method_map_path).ok();

    let zone_resolver = Arc::new(ZoneResolver::new(
        geocoding_adapter.clone(),
        cold_store.clone(),
        cold_store.clone(),
        config.clone(),
        country_method_map_json,
    ));

    // The channel dispatcher's job handler needs a `CalendarService` and a
    // `ScheduleMaterializer` to actually perform enqueued work, but those in
    // turn take a dispatcher to enqueue further work of their own. Break the
    // cycle with a job-handler-private instance whose dispatcher is never
    // exercised (neither a single yearly fetch nor a single schedule build
    // enqueues further jobs).
    let dispatcher: Arc<dyn Dispatcher>;
    {
        let inert_dispatcher = Arc::new(prayer_engine::dispatch::VecDispatcher::new());
        let worker_calendar_service = Arc::new(CalendarService::new(
            hot_cache.clone(),
            cold_store.clone(),
            prayer_adapter.clone(),
            inert_dispatcher.clone(),
            config.clone(),
            metrics.clone(),
        ));
        let worker_schedule_materializer = Arc::new(ScheduleMaterializer::new(
            worker_calendar_service.clone(),
            cold_store.clone(),
            cold_store.clone(),
            cold_store.clone(),
            zone_resolver.clone(),
        ));

        let worker_metrics = metrics.clone();
        let worker_cold_store = cold_store.clone();
        dispatcher = Arc::new(ChannelDispatcher::spawn(config.worker_pool_size, 1024, move |job| {
            let metrics = worker_metrics.clone();
            let cold_store = worker_cold_store.clone();
            let schedule_materializer = worker_schedule_materializer.clone();
            let calendar_service = worker_calendar_service.clone();
            async move {
                match job {
                    Job::FetchYearlyCalendar { zone_id, year, method_key, lat, lon } => {
                        if let Err(e) = calendar_service.fetch_and_cache_yearly(&zone_id, year, &method_key, lat, lon).await {
                            metrics.bg_task_runs.with_label_values(&["fetch_and_cache_yearly_calendar", "failure"]).inc();
                            tracing::error!(error = %e, zone_id, year, "yearly fetch failed");
                        } else {
                            metrics.bg_task_runs.with_label_values(&["fetch_and_cache_yearly_calendar", "success"]).inc();
                        }
                    }
                    Job::GenerateSchedule { owner_id, year, month } => {
                        if let Err(e) = schedule_materializer.get_or_generate_monthly(owner_id, year, month, true).await {
                            metrics.bg_task_runs.with_label_values(&["generate_schedule_for_single_user", "failure"]).inc();
                            tracing::error!(error = %e, owner_id, year, month, "schedule generation failed");
                        } else {
                            metrics.bg_task_runs.with_label_values(&["generate_schedule_for_single_user", "success"]).inc();
                        }
                    }
                    Job::CleanupOldCalendars { before_year } => {
                        if let Err(e) = cold_store.delete_years_before(before_year).await {
                            tracing::error!(error = %e, before_year, "cleanup failed");
                        }
                    }
                }
            }
        }));
    }

    let calendar_service = Arc::new(CalendarService::new(
        hot_cache,
        cold_store.clone(),
        prayer_adapter,
        dispatcher.clone(),
        config.clone(),
        metrics.clone(),
    ));

    let schedule_materializer = Arc::new(ScheduleMaterializer::new(
        calendar_service.clone(),
        cold_store.clone(),
        cold_store.clone(),
        cold_store.clone(),
        zone_resolver.clone(),
    ));

    let settings_hook = Arc::new(SettingsHook::new(cold_store.clone(), cold_store.clone(), cold_store.clone()));

    let workers = Arc::new(BackgroundWorkers::new(
        cold_store.clone(),
        cold_store.clone(),
        cold_store.clone(),
        dispatcher.clone(),
        config.clone(),
        metrics.clone(),
    ));
    workers.spawn_daily_ticker();

    let state = Arc::new(EngineState {
        config: config.clone(),
        metrics,
        calendar: calendar_service,
        zone_resolver,
        schedule: schedule_materializer,
        settings_hook,
        settings_repo: cold_store.clone(),
        owner_repo: cold_store.clone(),
        geocoder: geocoding_adapter,
        dispatcher,
    });

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "prayer schedule engine listening");
    axum::serve(listener, router).await?;
    Ok(())
}

fn init_tracing(config: &EngineConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Pretty => subscriber.init(),
    }
}
