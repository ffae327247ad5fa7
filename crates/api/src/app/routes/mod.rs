use axum::{
    routing::{get, post},
    Router,
};

use crate::middleware;

pub mod jobs;
pub mod registry;
pub mod studies;
pub mod system;

/// Router for everything under `/api`.
pub fn router() -> Router {
    // Everything touching the registry or a job carries the caller's token.
    let gated = Router::new()
        .route("/studies", post(studies::submit_study).get(registry::list_studies))
        .route("/studies/:study_id", get(registry::get_study))
        .route(
            "/studies/:study_id/signals",
            post(studies::submit_signal).get(registry::list_signals),
        )
        .route("/studies/:study_id/signals/:signal_id", get(registry::get_signal))
        .route("/templates", get(registry::list_templates))
        .route("/templates/:template_id", get(registry::get_template))
        .route("/templateTypes", get(registry::template_types))
        .nest("/jobs", jobs::router())
        .layer(axum::middleware::from_fn(middleware::require_token));

    Router::new()
        .route("/", get(system::version))
        .route("/worker", get(system::worker_stats))
        .merge(gated)
}
