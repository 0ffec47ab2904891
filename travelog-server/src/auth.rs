//! Access guard: resolves the caller's identity from an HS256 access token.
//!
//! The token is read from the configured cookie first, then from an
//! `Authorization: Bearer` header. The owner id comes from the `id` claim,
//! falling back to `sub`.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum_extra::extract::CookieJar;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use travelog_core::OwnerId;

use crate::error::StoryError;
use crate::http::HttpState;

#[derive(Debug, Deserialize)]
struct AccessClaims {
    id: Option<String>,
    sub: Option<String>,
}

#[derive(Clone)]
pub struct AccessGuard {
    key: DecodingKey,
    validation: Validation,
    cookie_name: String,
}

impl AccessGuard {
    pub fn new(secret: &[u8], cookie_name: impl Into<String>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Tokens are not required to expire, but an `exp` that is present is enforced.
        validation.required_spec_claims.clear();
        validation.validate_aud = false;

        Self {
            key: DecodingKey::from_secret(secret),
            validation,
            cookie_name: cookie_name.into(),
        }
    }

    pub fn verify(&self, token: &str) -> Result<OwnerId, StoryError> {
        let data = decode::<AccessClaims>(token, &self.key, &self.validation).map_err(|e| {
            tracing::debug!(error = %e, "Rejected access token");
            StoryError::Unauthorized
        })?;

        data.claims
            .id
            .or(data.claims.sub)
            .filter(|id| !id.is_empty())
            .map(OwnerId::new)
            .ok_or_else(|| {
                tracing::debug!("Access token carries no owner id");
                StoryError::Unauthorized
            })
    }

    pub fn token_from_parts(&self, parts: &Parts) -> Option<String> {
        let jar = CookieJar::from_headers(&parts.headers);
        if let Some(cookie) = jar.get(&self.cookie_name) {
            return Some(cookie.value().to_string());
        }

        parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(|token| token.trim().to_string())
    }
}

/// The authenticated owner of the current request.
#[derive(Debug, Clone)]
pub struct AuthUser(pub OwnerId);

#[axum::async_trait]
impl FromRequestParts<Arc<HttpState>> for AuthUser {
    type Rejection = StoryError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<HttpState>,
    ) -> Result<Self, Self::Rejection> {
        let token = state
            .guard
            .token_from_parts(parts)
            .ok_or(StoryError::Unauthorized)?;
        state.guard.verify(&token).map(AuthUser)
    }
}
