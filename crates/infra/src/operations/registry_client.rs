//! Outbound client for the study registry.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use thiserror::Error;

use uploader_core::{AccessToken, OperationError};

use crate::config::Environment;

/// Header the registry reads the caller's token from.
pub const TOKEN_HEADER: &str = "Genestack-API-Token";

/// A study ready to be sent to the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyUpload {
    /// Study-level metadata; string values only.
    pub metadata: Map<String, JsonValue>,
    /// Object key of the sample file within the bucket.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_file: Option<String>,
    pub renamed_columns: Vec<JsonValue>,
    pub added_columns: Vec<JsonValue>,
    pub deleted_columns: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkingAttribute {
    pub column: String,
}

/// A signal dataset to attach to a study.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalUpload {
    /// Object key of the data file.
    pub data: String,
    pub metadata: Map<String, JsonValue>,
    #[serde(rename = "linkingattribute")]
    pub linking_attributes: Vec<LinkingAttribute>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("registry refused the token")]
    Forbidden,
    #[error("registry could not find: {0}")]
    NotFound(String),
    #[error("registry rejected the upload: {0}")]
    Rejected(String),
    #[error("storage bucket permission denied")]
    StoragePermissionDenied,
    #[error("ambiguous registry answer: {0}")]
    Ambiguous(String),
    #[error("registry returned {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<UploadError> for OperationError {
    fn from(err: UploadError) -> Self {
        match err {
            UploadError::Forbidden => OperationError::Forbidden,
            UploadError::StoragePermissionDenied => OperationError::StoragePermissionDenied,
            UploadError::NotFound(detail) => OperationError::not_found("UpstreamNotFound", detail),
            UploadError::Rejected(detail) => OperationError::bad_request("UpstreamRejected", detail),
            e @ (UploadError::Upstream { .. } | UploadError::Ambiguous(_)) => {
                OperationError::unexpected("UpstreamError", e.to_string())
            }
            UploadError::Transport(detail) => OperationError::unexpected("TransportError", detail),
        }
    }
}

/// The registry operations jobs need.
///
/// Implementations are called from the worker thread and may block.
pub trait RegistryClient: Send + Sync {
    /// Create a study; returns its accession.
    fn create_study(&self, token: &AccessToken, study: &StudyUpload) -> Result<String, UploadError>;

    fn create_signal(
        &self,
        token: &AccessToken,
        study_accession: &str,
        signal: &SignalUpload,
    ) -> Result<(), UploadError>;
}

/// Signal groups a study's signals are listed under.
pub const SIGNAL_GROUPS: [&str; 2] = ["variant", "expression"];

/// Read-only registry lookups, proxied for the UI.
///
/// Blocking, like [`RegistryClient`]; async callers go through
/// `spawn_blocking`.
pub trait RegistryQueries: Send + Sync {
    fn list_studies(&self, token: &AccessToken) -> Result<JsonValue, UploadError>;

    fn get_study(&self, token: &AccessToken, study_accession: &str) -> Result<JsonValue, UploadError>;

    /// Every signal of the study across [`SIGNAL_GROUPS`].
    fn list_signals(
        &self,
        token: &AccessToken,
        study_accession: &str,
    ) -> Result<Vec<JsonValue>, UploadError>;

    fn list_templates(&self, token: &AccessToken) -> Result<JsonValue, UploadError>;

    fn get_template(&self, token: &AccessToken, template_id: &str) -> Result<JsonValue, UploadError>;

    fn template_types(&self, token: &AccessToken) -> Result<JsonValue, UploadError>;

    /// The one signal of the study whose `itemId` is `signal_id`.
    fn find_signal(
        &self,
        token: &AccessToken,
        study_accession: &str,
        signal_id: &str,
    ) -> Result<JsonValue, UploadError> {
        let mut matches: Vec<JsonValue> = self
            .list_signals(token, study_accession)?
            .into_iter()
            .filter(|s| s.get("itemId").and_then(JsonValue::as_str) == Some(signal_id))
            .collect();

        match matches.len() {
            0 => Err(UploadError::NotFound(format!(
                "signal {signal_id} not found on study {study_accession}"
            ))),
            1 => Ok(matches.remove(0)),
            _ => Err(UploadError::Ambiguous("multiple signals found".to_string())),
        }
    }
}

/// Map a non-success HTTP status onto the upload error taxonomy.
///
/// A 403 that names the storage bucket is the registry failing to read the
/// caller's object, not a refused token.
pub fn classify_status(status: u16, body: String) -> UploadError {
    match status {
        403 if mentions_storage(&body) => UploadError::StoragePermissionDenied,
        401 | 403 => UploadError::Forbidden,
        404 => UploadError::NotFound(body),
        400 | 422 => UploadError::Rejected(body),
        _ => UploadError::Upstream { status, body },
    }
}

fn mentions_storage(body: &str) -> bool {
    let body = body.to_ascii_lowercase();
    body.contains("bucket") || body.contains("s3://")
}

/// Pull `field` out of a registry response envelope.
fn unwrap_field(mut body: JsonValue, field: &str) -> Result<JsonValue, UploadError> {
    body.get_mut(field)
        .map(JsonValue::take)
        .ok_or_else(|| UploadError::Transport(format!("registry response has no `{field}`")))
}

#[derive(Debug, Deserialize)]
struct CreatedStudy {
    accession: String,
}

/// HTTP implementation over `reqwest`'s blocking client.
#[derive(Debug, Clone)]
pub struct HttpRegistryClient {
    http: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpRegistryClient {
    /// Must not be called from inside an async runtime.
    pub fn new(environment: &Environment) -> Result<Self, UploadError> {
        let http = reqwest::blocking::Client::builder()
            .user_agent(concat!("study-uploader/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            endpoint: environment.registry_endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn get(&self, url: String, token: &AccessToken) -> Result<JsonValue, UploadError> {
        let res = self
            .http
            .get(url)
            .header(TOKEN_HEADER, token.expose())
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        let res = Self::check(res)?;
        res.json()
            .map_err(|e| UploadError::Transport(format!("unreadable registry response: {e}")))
    }

    fn post<B: Serialize>(
        &self,
        url: String,
        token: &AccessToken,
        body: &B,
    ) -> Result<reqwest::blocking::Response, UploadError> {
        let res = self
            .http
            .post(url)
            .header(TOKEN_HEADER, token.expose())
            .json(body)
            .send()
            .map_err(|e| UploadError::Transport(e.to_string()))?;

        Self::check(res)
    }

    fn check(res: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, UploadError> {
        let status = res.status();
        if status.is_success() {
            Ok(res)
        } else {
            let body = res.text().unwrap_or_default();
            Err(classify_status(status.as_u16(), body))
        }
    }
}

impl RegistryClient for HttpRegistryClient {
    fn create_study(&self, token: &AccessToken, study: &StudyUpload) -> Result<String, UploadError> {
        let res = self.post(format!("{}/studies", self.endpoint), token, study)?;
        let created: CreatedStudy = res
            .json()
            .map_err(|e| UploadError::Transport(format!("unreadable registry response: {e}")))?;
        Ok(created.accession)
    }

    fn create_signal(
        &self,
        token: &AccessToken,
        study_accession: &str,
        signal: &SignalUpload,
    ) -> Result<(), UploadError> {
        self.post(
            format!("{}/studies/{}/signals", self.endpoint, study_accession),
            token,
            signal,
        )?;
        Ok(())
    }
}

impl RegistryQueries for HttpRegistryClient {
    fn list_studies(&self, token: &AccessToken) -> Result<JsonValue, UploadError> {
        let body = self.get(format!("{}/studies", self.endpoint), token)?;
        unwrap_field(body, "data")
    }

    fn get_study(&self, token: &AccessToken, study_accession: &str) -> Result<JsonValue, UploadError> {
        self.get(format!("{}/studies/{}", self.endpoint, study_accession), token)
    }

    fn list_signals(
        &self,
        token: &AccessToken,
        study_accession: &str,
    ) -> Result<Vec<JsonValue>, UploadError> {
        let mut signals = Vec::new();
        for group in SIGNAL_GROUPS {
            let url = format!(
                "{}/studies/{}/signals?group={}",
                self.endpoint, study_accession, group
            );
            match self.get(url, token)? {
                JsonValue::Array(items) => signals.extend(items),
                other => {
                    return Err(UploadError::Transport(format!(
                        "expected a list of {group} signals, got {other}"
                    )))
                }
            }
        }
        Ok(signals)
    }

    fn list_templates(&self, token: &AccessToken) -> Result<JsonValue, UploadError> {
        let body = self.get(format!("{}/templates", self.endpoint), token)?;
        unwrap_field(body, "result")
    }

    fn get_template(&self, token: &AccessToken, template_id: &str) -> Result<JsonValue, UploadError> {
        let body = self.get(format!("{}/templates/{}", self.endpoint, template_id), token)?;
        unwrap_field(body, "result")
    }

    fn template_types(&self, token: &AccessToken) -> Result<JsonValue, UploadError> {
        let body = self.get(format!("{}/templateTypes", self.endpoint), token)?;
        unwrap_field(body, "result")
    }
}
