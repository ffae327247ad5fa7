use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    routing::get,
    Router,
};
use serde_json::json;

use uploader_core::JobId;

use crate::app::errors;
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_jobs))
        .route("/:job_id", get(get_job))
}

pub async fn get_job(
    Extension(services): Extension<Arc<AppServices>>,
    Path(job_id): Path<String>,
) -> axum::response::Response {
    // A malformed id can't belong to any job.
    let Ok(id) = job_id.parse::<JobId>() else {
        return errors::fail(StatusCode::NOT_FOUND, format!("not found: {job_id}"));
    };

    match services.jobs.get(id) {
        Ok(snapshot) => errors::ok(StatusCode::OK, snapshot),
        Err(e) => errors::registry_error_to_response(e),
    }
}

pub async fn list_jobs(Extension(services): Extension<Arc<AppServices>>) -> axum::response::Response {
    let jobs: Vec<_> = services
        .jobs
        .list()
        .into_iter()
        .map(|h| {
            json!({
                "jobId": h.id.to_string(),
                "kind": h.kind.as_str(),
                "status": h.last_seen.status,
            })
        })
        .collect();

    errors::ok(StatusCode::OK, jobs)
}
