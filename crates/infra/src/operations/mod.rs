//! Upload operations run by the job worker.

pub mod registry_client;
pub mod signal;
pub mod study;

use std::sync::Arc;

use uploader_core::JobKind;

use crate::jobs::dispatch::Dispatcher;

pub use registry_client::{
    HttpRegistryClient, LinkingAttribute, RegistryClient, RegistryQueries, SignalUpload,
    StudyUpload, UploadError,
};
pub use signal::CreateSignal;
pub use study::CreateStudy;

/// Dispatcher with every job kind wired to its operation.
pub fn standard_dispatcher(client: Arc<dyn RegistryClient>) -> Dispatcher {
    Dispatcher::new()
        .with(JobKind::Study, Arc::new(CreateStudy::new(client.clone())))
        .with(JobKind::Signal, Arc::new(CreateSignal::new(client)))
}
