use uploader_core::AccessToken;

/// Caller credential for a submission request.
///
/// Inserted by [`crate::middleware::require_token`]; handed to the job and
/// from there to the registry, never stored.
#[derive(Debug, Clone)]
pub struct RequestToken(AccessToken);

impl RequestToken {
    pub fn new(token: AccessToken) -> Self {
        Self(token)
    }

    pub fn into_inner(self) -> AccessToken {
        self.0
    }
}
