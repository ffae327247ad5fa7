use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::{json, Value as JsonValue};

use uploader_core::JobKind;

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestToken;

/// Shape is checked by the operation, not here; any JSON value is accepted.
fn parse_body(body: &[u8]) -> Result<JsonValue, axum::response::Response> {
    serde_json::from_slice(body)
        .map_err(|_| errors::fail(StatusCode::BAD_REQUEST, "no valid json body"))
}

fn submit(
    services: &AppServices,
    kind: JobKind,
    token: RequestToken,
    payload: JsonValue,
    context_id: Option<String>,
) -> axum::response::Response {
    match services
        .jobs
        .submit(kind, token.into_inner(), payload, context_id)
    {
        Ok(id) => errors::ok(StatusCode::ACCEPTED, json!({ "jobId": id.to_string() })),
        Err(e) => errors::submit_error_to_response(e),
    }
}

pub async fn submit_study(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    body: Bytes,
) -> axum::response::Response {
    let payload = match parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    submit(&services, JobKind::Study, token, payload, None)
}

pub async fn submit_signal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    Path(study_id): Path<String>,
    body: Bytes,
) -> axum::response::Response {
    let payload = match parse_body(&body) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    submit(&services, JobKind::Signal, token, payload, Some(study_id))
}
