//! Study creation.

use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::info;

use uploader_core::{JobOutcome, OperationError};

use super::registry_client::{RegistryClient, StudyUpload};
use crate::config::Environment;
use crate::jobs::dispatch::{Operation, OperationContext};

const STUDY_SOURCE: &str = "Study Source";
const STUDY_TITLE: &str = "Study Title";
const SAMPLE_FILE: &str = "Sample File";

pub struct CreateStudy {
    client: Arc<dyn RegistryClient>,
}

impl CreateStudy {
    pub fn new(client: Arc<dyn RegistryClient>) -> Self {
        Self { client }
    }
}

impl Operation for CreateStudy {
    fn execute(&self, ctx: &OperationContext<'_>) -> Result<JobOutcome, OperationError> {
        let upload = prepare_study(ctx.payload, ctx.environment)?;

        if !upload.renamed_columns.is_empty()
            || !upload.added_columns.is_empty()
            || !upload.deleted_columns.is_empty()
        {
            info!(
                renamed = upload.renamed_columns.len(),
                added = upload.added_columns.len(),
                deleted = upload.deleted_columns.len(),
                "sample file columns will change"
            );
        }

        info!(server = ctx.environment.server.as_str(), "creating study");
        let accession = self.client.create_study(ctx.token, &upload)?;
        info!(accession = %accession, "study created");

        Ok(JobOutcome::study_created(accession))
    }
}

/// Validate and normalise a study payload.
///
/// - the payload must be an object
/// - `Study Source` is required; an empty `Study Title` falls back to it
/// - column-change lists are split out of the metadata
/// - `Sample File` loses the configured bucket's `s3://` prefix
pub fn prepare_study(payload: &JsonValue, env: &Environment) -> Result<StudyUpload, OperationError> {
    let mut body = payload.as_object().cloned().ok_or(OperationError::InvalidBody)?;

    let renamed_columns = take_list(&mut body, "renamedColumns")?;
    let added_columns = take_list(&mut body, "addedColumns")?;
    let deleted_columns = take_list(&mut body, "deletedColumns")?;

    let sample_file = match body.remove(SAMPLE_FILE) {
        None | Some(JsonValue::Null) => None,
        Some(JsonValue::String(s)) => normalise_sample_file(&s, env.storage_bucket.as_deref()),
        Some(_) => return Err(OperationError::bad_request("InvalidField", SAMPLE_FILE)),
    };

    let mut metadata = Map::new();
    for (key, value) in body {
        match value {
            JsonValue::String(s) => {
                metadata.insert(key.trim().to_string(), JsonValue::String(s.trim().to_string()));
            }
            _ => return Err(OperationError::bad_request("InvalidField", key)),
        }
    }

    let source = metadata
        .get(STUDY_SOURCE)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| OperationError::bad_request("MissingField", STUDY_SOURCE))?;

    let has_title = metadata
        .get(STUDY_TITLE)
        .and_then(JsonValue::as_str)
        .is_some_and(|t| !t.is_empty());
    if !has_title {
        metadata.insert(STUDY_TITLE.to_string(), JsonValue::String(source));
    }

    Ok(StudyUpload {
        metadata,
        sample_file,
        renamed_columns,
        added_columns,
        deleted_columns,
    })
}

fn take_list(body: &mut Map<String, JsonValue>, key: &str) -> Result<Vec<JsonValue>, OperationError> {
    match body.remove(key) {
        None | Some(JsonValue::Null) => Ok(Vec::new()),
        Some(JsonValue::Array(items)) => Ok(items),
        Some(_) => Err(OperationError::bad_request("InvalidField", key)),
    }
}

fn normalise_sample_file(raw: &str, bucket: Option<&str>) -> Option<String> {
    let trimmed = raw.trim();
    let key = match bucket {
        Some(bucket) => {
            let prefix = format!("s3://{bucket}/");
            trimmed.strip_prefix(prefix.as_str()).unwrap_or(trimmed)
        }
        None => trimmed,
    };
    (!key.is_empty()).then(|| key.to_string())
}
