//! Bearer-token verification against the external identity provider.
//!
//! Tokens are RS256 JWTs signed by the provider; the signing keys come from
//! the provider's JWKS endpoint and are cached in-process. An unknown `kid`
//! triggers exactly one refetch to pick up rotated keys.

use std::sync::Arc;

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use tokio::sync::RwLock;

use crate::auth::claims::{IdentityClaims, RemoteProfile};
use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Clone)]
pub struct TokenVerifier {
    http: reqwest::Client,
    jwks: Arc<RwLock<Option<JwkSet>>>,
}

impl TokenVerifier {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
            jwks: Arc::new(RwLock::new(None)),
        }
    }

    pub async fn verify(&self, token: &str, config: &Config) -> AppResult<IdentityClaims> {
        let header = decode_header(token).map_err(|_| AppError::Unauthorized)?;
        let kid = header.kid.ok_or(AppError::Unauthorized)?;

        let key = self.decoding_key(&kid, config).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&config.identity_issuer]);
        validation.validate_aud = false;

        let data = decode::<IdentityClaims>(token, &key, &validation).map_err(|e| {
            tracing::debug!(error = %e, "Token verification failed");
            AppError::Unauthorized
        })?;

        Ok(data.claims)
    }

    async fn decoding_key(&self, kid: &str, config: &Config) -> AppResult<DecodingKey> {
        if let Some(jwks) = self.jwks.read().await.as_ref() {
            if let Some(jwk) = jwks.find(kid) {
                return DecodingKey::from_jwk(jwk).map_err(|_| AppError::Unauthorized);
            }
        }

        // Cache miss or rotated key — refetch once
        let jwks = self.fetch_jwks(config).await?;
        let key = jwks
            .find(kid)
            .ok_or(AppError::Unauthorized)
            .and_then(|jwk| DecodingKey::from_jwk(jwk).map_err(|_| AppError::Unauthorized));
        *self.jwks.write().await = Some(jwks);
        key
    }

    async fn fetch_jwks(&self, config: &Config) -> AppResult<JwkSet> {
        let url = config.jwks_url();
        let jwks = self
            .http
            .get(&url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWKS fetch failed: {e}")))?
            .json::<JwkSet>()
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("JWKS parse failed: {e}")))?;

        tracing::info!(url = %url, keys = jwks.keys.len(), "Refreshed identity provider JWKS");
        Ok(jwks)
    }

    /// Fetch profile fields from the provider's user management API. Used
    /// only when a token carries no profile data; returns None when the
    /// management key is not configured or the lookup fails.
    pub async fn fetch_remote_profile(
        &self,
        external_id: &str,
        config: &Config,
    ) -> Option<RemoteProfile> {
        if config.identity_secret_key.is_empty() {
            return None;
        }

        let url = format!(
            "{}/users/{}",
            config.identity_api_url.trim_end_matches('/'),
            external_id
        );
        let result = self
            .http
            .get(&url)
            .bearer_auth(&config.identity_secret_key)
            .send()
            .await
            .and_then(|r| r.error_for_status());

        match result {
            Ok(response) => match response.json::<RemoteProfile>().await {
                Ok(profile) => Some(profile),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to parse provider profile response");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, external_id, "Provider profile lookup failed");
                None
            }
        }
    }
}

impl Default for TokenVerifier {
    fn default() -> Self {
        Self::new()
    }
}
