use axum::{
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};

use uploader_core::AccessToken;
use uploader_infra::operations::registry_client::TOKEN_HEADER;

use crate::app::errors;
use crate::context::RequestToken;

/// Reject requests without a registry token; stash it for the handler.
pub async fn require_token(
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let Some(token) = extract_token(req.headers()).map(AccessToken::new) else {
        return errors::fail(StatusCode::UNAUTHORIZED, "missing token");
    };

    req.extensions_mut().insert(RequestToken::new(token));

    next.run(req).await
}

fn extract_token(headers: &HeaderMap) -> Option<&str> {
    let token = headers.get(TOKEN_HEADER)?.to_str().ok()?.trim();
    (!token.is_empty()).then_some(token)
}
