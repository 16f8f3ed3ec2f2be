use axum::http::HeaderMap;
use sha2::digest::Output;
use sha2::{Digest, Sha256};

/// Header carrying the client's API key.
pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Missing X-API-Key header")]
    MissingHeader,
    #[error("Invalid X-API-Key header format")]
    InvalidFormat,
    #[error("Invalid API key")]
    InvalidKey,
}

/// Validates the shared API key.
///
/// Only the SHA-256 digest of the configured key is kept; presented keys are
/// hashed and compared digest to digest.
pub struct ApiKeyAuth {
    digest: Output<Sha256>,
}

impl ApiKeyAuth {
    pub fn new(api_key: &str) -> Self {
        Self {
            digest: Sha256::digest(api_key.as_bytes()),
        }
    }

    /// Short hex prefix of the key digest, safe to log.
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest[..4])
    }

    pub fn verify(&self, presented: &str) -> bool {
        Sha256::digest(presented.as_bytes()) == self.digest
    }

    /// Authenticate a request by its `X-API-Key` header.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), AuthError> {
        let presented = headers
            .get(API_KEY_HEADER)
            .ok_or(AuthError::MissingHeader)?
            .to_str()
            .map_err(|_| AuthError::InvalidFormat)?;

        if self.verify(presented) {
            Ok(())
        } else {
            Err(AuthError::InvalidKey)
        }
    }
}
