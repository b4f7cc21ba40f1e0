//! Gateway authentication.
//!
//! Verification is a pluggable seam: the gateway only knows about
//! [`TokenVerifier`]. The built-in [`StaticTokenVerifier`] accepts a fixed
//! set of bearer/API keys and compares SHA-256 digests so raw secrets are
//! never held after startup. Policy design beyond that (JWT issuance,
//! scopes) is deliberately out of scope; this is the hook point.

/// Token-bucket rate limiting keyed by caller identity.
pub mod rate_limit;

use crate::types::{AppError, Result};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;

/// Verified identity of a caller, inserted into request extensions and used
/// as the rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller(pub String);

/// Pluggable credential verifier.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Verify a presented bearer token / API key and resolve the caller
    /// identity.
    async fn verify(&self, token: &str) -> Result<Caller>;
}

/// Accepts a fixed set of keys configured at startup. Identities are the
/// first 12 hex characters of the key digest, which keeps logs and
/// rate-limit keys free of secret material.
pub struct StaticTokenVerifier {
    digests: HashMap<String, Caller>,
}

impl StaticTokenVerifier {
    /// Build a verifier from raw secrets.
    pub fn new<I, S>(secrets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = secrets
            .into_iter()
            .map(|secret| {
                let digest = hex::encode(Sha256::digest(secret.as_ref().as_bytes()));
                let identity = Caller(digest[..12].to_string());
                (digest, identity)
            })
            .collect();
        Self { digests }
    }
}

#[async_trait]
impl TokenVerifier for StaticTokenVerifier {
    async fn verify(&self, token: &str) -> Result<Caller> {
        let digest = hex::encode(Sha256::digest(token.as_bytes()));
        self.digests
            .get(&digest)
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("invalid credentials".to_string()))
    }
}

/// Accepts any caller; used when no secret is configured (local runs).
pub struct NoAuthVerifier;

#[async_trait]
impl TokenVerifier for NoAuthVerifier {
    async fn verify(&self, _token: &str) -> Result<Caller> {
        Ok(Caller("anonymous".to_string()))
    }
}

/// Pull the credential out of `Authorization: Bearer ...` or `X-API-Key`.
fn extract_token(parts: &axum::http::HeaderMap) -> Option<String> {
    if let Some(value) = parts
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }
    parts
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

/// Gateway auth + rate-limit middleware. Verifies credentials, checks the
/// caller's token bucket, then stores the [`Caller`] in request extensions.
pub async fn auth_middleware(
    verifier: Arc<dyn TokenVerifier>,
    limiter: Arc<rate_limit::CallerRateLimiter>,
    mut req: Request,
    next: Next,
) -> std::result::Result<Response, AppError> {
    let token = extract_token(req.headers()).unwrap_or_default();
    let caller = verifier.verify(&token).await?;
    limiter.check(&caller.0)?;
    req.extensions_mut().insert(caller);
    Ok(next.run(req).await)
}

/// Extractor for the verified caller identity.
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Caller>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("missing caller identity".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_verifier_accepts_known_keys() {
        let verifier = StaticTokenVerifier::new(["sekrit-1", "sekrit-2"]);
        let a = verifier.verify("sekrit-1").await.unwrap();
        let b = verifier.verify("sekrit-2").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(a.0.len(), 12);
    }

    #[tokio::test]
    async fn static_verifier_rejects_unknown_keys() {
        let verifier = StaticTokenVerifier::new(["sekrit"]);
        assert!(matches!(
            verifier.verify("wrong").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            verifier.verify("").await,
            Err(AppError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn no_auth_verifier_accepts_everything() {
        let caller = NoAuthVerifier.verify("").await.unwrap();
        assert_eq!(caller.0, "anonymous");
    }

    #[test]
    fn token_extraction_prefers_bearer() {
        let mut headers = axum::http::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc".parse().unwrap());
        headers.insert("x-api-key", "xyz".parse().unwrap());
        assert_eq!(extract_token(&headers).as_deref(), Some("abc"));

        headers.remove(header::AUTHORIZATION);
        assert_eq!(extract_token(&headers).as_deref(), Some("xyz"));
    }
}
