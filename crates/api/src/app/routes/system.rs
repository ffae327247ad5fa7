use std::sync::Arc;

use axum::{extract::Extension, http::StatusCode};
use serde_json::json;

use crate::app::errors;
use crate::app::services::AppServices;

pub async fn health() -> StatusCode {
    StatusCode::OK
}

pub async fn version(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    errors::ok(
        StatusCode::OK,
        json!({
            "version": env!("CARGO_PKG_VERSION"),
            "server": services.environment.server.as_str(),
        }),
    )
}

pub async fn worker_stats(
    Extension(services): Extension<Arc<AppServices>>,
) -> axum::response::Response {
    errors::ok(StatusCode::OK, services.worker_stats.snapshot())
}
