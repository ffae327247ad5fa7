//! Response envelope: `{"status": "OK" | "FAIL", "data": ...}`.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;
use serde_json::json;

use uploader_infra::jobs::{RegistryError, SubmitError};
use uploader_infra::operations::UploadError;

pub fn ok(status: StatusCode, data: impl Serialize) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "OK",
            "data": data,
        })),
    )
        .into_response()
}

pub fn fail(status: StatusCode, error: impl Into<String>) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "status": "FAIL",
            "data": { "error": error.into() },
        })),
    )
        .into_response()
}

pub fn internal(message: impl Into<String>) -> axum::response::Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        axum::Json(json!({
            "status": "FAIL",
            "data": {
                "error": "internal server error",
                "message": message.into(),
            },
        })),
    )
        .into_response()
}

pub fn submit_error_to_response(err: SubmitError) -> axum::response::Response {
    tracing::error!(error = %err, "job submission failed");
    internal(err.to_string())
}

pub fn registry_error_to_response(err: RegistryError) -> axum::response::Response {
    match err {
        RegistryError::NotFound(id) => fail(StatusCode::NOT_FOUND, format!("not found: {id}")),
        RegistryError::Store(e) => {
            tracing::error!(error = %e, "job lookup failed");
            internal(e.to_string())
        }
    }
}

pub fn upload_error_to_response(err: UploadError) -> axum::response::Response {
    match err {
        UploadError::Forbidden => fail(StatusCode::FORBIDDEN, "forbidden"),
        UploadError::StoragePermissionDenied => {
            fail(StatusCode::FORBIDDEN, "S3 bucket permission denied")
        }
        UploadError::NotFound(detail) => fail(StatusCode::NOT_FOUND, format!("not found: {detail}")),
        e => {
            tracing::error!(error = %e, "registry lookup failed");
            internal(e.to_string())
        }
    }
}
