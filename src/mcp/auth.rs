//! Pluggable request authorization.
//!
//! The transport consults an [`Authorizer`] before touching any session
//! state. [`ApiKeyAuthorizer`] accepts a shared key presented either as
//! `Authorization: Bearer <key>` or `X-API-Key: <key>`; keys are compared
//! by SHA-256 digest so the comparison time does not depend on how much of
//! the key matched.

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use sha2::{Digest, Sha256};
use tracing::debug;

/// Header carrying a bare API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Injected authorization predicate.
pub trait Authorizer: Send + Sync {
    /// Whether a request with `headers` may proceed.
    fn is_authorized(&self, headers: &HeaderMap) -> bool;
}

/// Accepts every request. Used when no API key is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn is_authorized(&self, _headers: &HeaderMap) -> bool {
        true
    }
}

/// Shared-secret API key check.
#[derive(Clone)]
pub struct ApiKeyAuthorizer {
    digest: [u8; 32],
}

impl std::fmt::Debug for ApiKeyAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthorizer").finish_non_exhaustive()
    }
}

impl ApiKeyAuthorizer {
    /// Create an authorizer for `api_key`.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            digest: sha256(api_key.as_bytes()),
        }
    }
}

impl Authorizer for ApiKeyAuthorizer {
    fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(presented) = presented_key(headers) else {
            debug!("request missing API key or Authorization header");
            return false;
        };
        let digest = sha256(presented.as_bytes());
        digest
            .iter()
            .zip(self.digest.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

/// Build the authorizer for an optional configured key.
#[must_use]
pub fn from_api_key(api_key: Option<&str>) -> Box<dyn Authorizer> {
    match api_key.filter(|key| !key.is_empty()) {
        Some(key) => Box::new(ApiKeyAuthorizer::new(key)),
        None => Box::new(AllowAll),
    }
}

/// Extract the key from `Authorization: Bearer` or `X-API-Key`.
fn presented_key(headers: &HeaderMap) -> Option<&str> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    let api_key = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim);
    bearer.or(api_key).filter(|key| !key.is_empty())
}

fn sha256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}
