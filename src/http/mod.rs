pub mod routes;
pub mod state;

pub use state::EngineState;

use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<EngineState>) -> Router {
    Router::new()
        .route("/prayer/initial", get(routes::get_prayer_initial))
        .route("/schedule/monthly", get(routes::get_schedule_monthly))
        .route("/guest/follow", post(routes::post_guest_follow))
        .route("/owner/settings", post(routes::post_owner_settings))
        .route("/metrics", get(routes::get_metrics))
        .route("/healthz", get(routes::get_healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
