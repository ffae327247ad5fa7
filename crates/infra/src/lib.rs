//! Infrastructure layer: config, job persistence and execution, registry client.

pub mod config;
pub mod jobs;
pub mod operations;
