//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: job store, worker, and registry wiring
//! - `routes/`: HTTP routes + handlers
//! - `errors.rs`: the `{"status", "data"}` response envelope

use std::sync::Arc;

use axum::{routing::get, Extension, Router};
use tower::ServiceBuilder;

pub mod errors;
pub mod routes;
pub mod services;

use services::AppServices;

/// Build the full HTTP router (public entrypoint used by `main.rs`).
pub fn build_app(services: Arc<AppServices>) -> Router {
    Router::new()
        .route("/health", get(routes::system::health))
        .nest("/api", routes::router())
        .layer(ServiceBuilder::new().layer(Extension(services)))
}
