//! Read-only registry lookups, forwarded with the caller's token.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
};
use serde_json::{json, Value as JsonValue};

use uploader_core::AccessToken;
use uploader_infra::operations::{RegistryQueries, UploadError};

use crate::app::errors;
use crate::app::services::AppServices;
use crate::context::RequestToken;

/// Run a blocking registry lookup off the async workers.
async fn query<F>(services: &AppServices, token: RequestToken, lookup: F) -> axum::response::Response
where
    F: FnOnce(&dyn RegistryQueries, &AccessToken) -> Result<JsonValue, UploadError> + Send + 'static,
{
    let registry = services.registry.clone();
    let token = token.into_inner();

    match tokio::task::spawn_blocking(move || lookup(registry.as_ref(), &token)).await {
        Ok(Ok(data)) => errors::ok(StatusCode::OK, data),
        Ok(Err(e)) => errors::upload_error_to_response(e),
        Err(e) => {
            tracing::error!(error = %e, "registry lookup task failed");
            errors::internal(e.to_string())
        }
    }
}

pub async fn list_studies(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
) -> axum::response::Response {
    query(&services, token, |r, t| r.list_studies(t)).await
}

pub async fn get_study(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    Path(study_id): Path<String>,
) -> axum::response::Response {
    query(&services, token, move |r, t| r.get_study(t, &study_id)).await
}

pub async fn list_signals(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    Path(study_id): Path<String>,
) -> axum::response::Response {
    query(&services, token, move |r, t| {
        let signals = r.list_signals(t, &study_id)?;
        Ok(json!({ "studyAccession": study_id, "signals": signals }))
    })
    .await
}

pub async fn get_signal(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    Path((study_id, signal_id)): Path<(String, String)>,
) -> axum::response::Response {
    query(&services, token, move |r, t| {
        let signal = r.find_signal(t, &study_id, &signal_id)?;
        Ok(json!({ "studyAccession": study_id, "signal": signal }))
    })
    .await
}

pub async fn list_templates(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
) -> axum::response::Response {
    query(&services, token, |r, t| r.list_templates(t)).await
}

pub async fn get_template(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
    Path(template_id): Path<String>,
) -> axum::response::Response {
    query(&services, token, move |r, t| {
        let template = r.get_template(t, &template_id)?;
        Ok(json!({ "accession": template_id, "template": template }))
    })
    .await
}

pub async fn template_types(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(token): Extension<RequestToken>,
) -> axum::response::Response {
    query(&services, token, |r, t| r.template_types(t)).await
}
