//! Configuration loading and representation.
//!
//! Everything is read once at process start. [`Environment`] is the slice of
//! configuration handed to operations; it is wrapped in an `Arc` and never
//! mutated afterwards.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::Duration;
use thiserror::Error;

/// Default retention window for finished jobs.
pub const DEFAULT_JOB_EXPIRY_HOURS: i64 = 168;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be an integer number of hours, got {value:?}")]
    InvalidExpiry { var: &'static str, value: String },

    #[error("{var} must be `default` or `qc`, got {value:?}")]
    InvalidServer { var: &'static str, value: String },

    #[error("{var} is not a valid socket address: {value:?}")]
    InvalidBindAddr { var: &'static str, value: String },
}

/// Which registry deployment uploads go to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RegistryServer {
    Default,
    Qc,
}

impl RegistryServer {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistryServer::Default => "default",
            RegistryServer::Qc => "qc",
        }
    }

    pub fn endpoint(&self) -> String {
        match self {
            RegistryServer::Default => "https://genestack.sanger.ac.uk".to_string(),
            RegistryServer::Qc => "https://genestack-qc.sanger.ac.uk".to_string(),
        }
    }
}

/// Read-only configuration shared by every operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Environment {
    pub server: RegistryServer,
    /// Base URL of the registry API.
    pub registry_endpoint: String,
    /// Object-storage bucket sample files are staged in.
    pub storage_bucket: Option<String>,
    /// Per-job scratch directories are created under here.
    pub scratch_root: PathBuf,
}

impl Environment {
    /// Environment pointing at `endpoint`, with everything else defaulted.
    pub fn for_endpoint(endpoint: impl Into<String>) -> Self {
        Self {
            server: RegistryServer::Default,
            registry_endpoint: endpoint.into(),
            storage_bucket: None,
            scratch_root: std::env::temp_dir().join("study-uploader"),
        }
    }
}

/// Process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    /// Directory holding one snapshot file per job.
    pub jobs_dir: PathBuf,
    /// How long finished jobs stay pollable.
    pub job_expiry: Duration,
    pub environment: Environment,
}

impl Settings {
    /// Load settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup` (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_addr = match lookup("BIND_ADDR") {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidBindAddr {
                var: "BIND_ADDR",
                value,
            })?,
            None => SocketAddr::from(([0, 0, 0, 0], 8080)),
        };

        let job_expiry = match lookup("JOB_EXPIRY_HOURS") {
            Some(value) => value
                .trim()
                .parse::<i64>()
                .ok()
                .filter(|h| *h >= 0)
                .and_then(Duration::try_hours)
                .ok_or(ConfigError::InvalidExpiry {
                    var: "JOB_EXPIRY_HOURS",
                    value: value.clone(),
                })?,
            None => Duration::hours(DEFAULT_JOB_EXPIRY_HOURS),
        };

        let server = match lookup("GS_SERVER").as_deref().map(str::trim) {
            None | Some("default") => RegistryServer::Default,
            Some("qc") => RegistryServer::Qc,
            Some(other) => {
                return Err(ConfigError::InvalidServer {
                    var: "GS_SERVER",
                    value: other.to_string(),
                });
            }
        };

        let environment = Environment {
            server,
            registry_endpoint: lookup("REGISTRY_ENDPOINT").unwrap_or_else(|| server.endpoint()),
            storage_bucket: lookup("S3_BUCKET").filter(|b| !b.is_empty()),
            scratch_root: lookup("SCRATCH_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| std::env::temp_dir().join("study-uploader")),
        };

        Ok(Self {
            bind_addr,
            jobs_dir: lookup("JOBS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".jobs")),
            job_expiry,
            environment,
        })
    }
}
