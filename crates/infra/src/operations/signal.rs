//! Signal dataset upload into an existing study.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::info;

use uploader_core::{JobOutcome, OperationError};

use super::registry_client::{LinkingAttribute, RegistryClient, SignalUpload};
use crate::jobs::dispatch::{Operation, OperationContext};

/// Linking column the registry derives itself; callers must not send it.
const IMPLICIT_LINK: &str = "Sample Source ID";

pub struct CreateSignal {
    client: Arc<dyn RegistryClient>,
}

impl CreateSignal {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

impl Operation for CreateSignal {
    fn execute(&self, ctx: &OperationContext<'_>) -> Result<JobOutcome, OperationError> {
        let (accession, upload) = prepare_signal(ctx.payload, ctx.context_id)?;

        info!(
            study_accession = %accession,
            links = upload.linking_attributes.len(),
            "creating signal dataset"
        );
        self.client.create_signal(ctx.token, &accession, &upload)?;
        info!(study_accession = %accession, "signal dataset created");

        Ok(JobOutcome::signal_created(accession))
    }
}

/// Validate a signal payload and resolve the study it belongs to.
pub fn prepare_signal(
    payload: &JsonValue,
    context_id: Option<&str>,
) -> Result<(String, SignalUpload), OperationError> {
    let accession = context_id
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            OperationError::bad_request("MissingStudyAccession", "study accession is required")
        })?
        .to_string();

    let body = payload.as_object().ok_or(OperationError::InvalidBody)?;

    let data = match body.get("data") {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(JsonValue::String(_)) | None | Some(JsonValue::Null) => {
            return Err(OperationError::bad_request("MissingField", "data"));
        }
        Some(_) => return Err(OperationError::bad_request("InvalidField", "data")),
    };

    let metadata = match body.get("metadata") {
        Some(JsonValue::Object(map)) => string_map(map)?,
        None | Some(JsonValue::Null) => {
            return Err(OperationError::bad_request("MissingField", "metadata"));
        }
        Some(_) => return Err(OperationError::bad_request("InvalidField", "metadata")),
    };

    let linking_attributes = match body.get("linkingattribute") {
        Some(JsonValue::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::trim)
                    .ok_or_else(|| OperationError::bad_request("InvalidField", "linkingattribute"))
            })
            .filter(|column| !matches!(column, Ok(c) if *c == IMPLICIT_LINK))
            .map(|column| column.map(|c| LinkingAttribute { column: c.to_string() }))
            .collect::<Result<Vec<_>, _>>()?,
        None | Some(JsonValue::Null) => {
            return Err(OperationError::bad_request("MissingField", "linkingattribute"));
        }
        Some(_) => return Err(OperationError::bad_request("InvalidField", "linkingattribute")),
    };

    Ok((
        accession,
        SignalUpload {
            data,
            metadata,
            linking_attributes,
        },
    ))
}

fn string_map(map: &Map<String, JsonValue>) -> Result<Map<String, JsonValue>, OperationError> {
    map.iter()
        .map(|(key, value)| match value {
            JsonValue::String(s) => Ok((key.trim().to_string(), JsonValue::String(s.trim().to_string()))),
            _ => Err(OperationError::bad_request("InvalidField", format!("metadata.{key}"))),
        })
        .collect()
}
