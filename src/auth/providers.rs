//! Concrete `TenantProvider` implementations (spec.md §4.8, supplemented
//! per SPEC_FULL.md from `gateway/auth/providers.py`).

use async_trait::async_trait;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::ids::TenantId;

use super::{AuthError, TenantProvider};

/// Verifies a bearer JWT and extracts the tenant claim. Generalizes the
/// original's Clerk-specific `ClerkProvider` (a single static RS256 key) to
/// any RS256/HS256 token carrying an `org_id` or `tenant_id` claim.
pub struct JwtProvider {
    decoding_key: DecodingKey,
    validation: Validation,
}

#[derive(Debug, Deserialize)]
struct TenantClaims {
    #[serde(alias = "org_id", default)]
    tenant_id: Option<String>,
}

impl JwtProvider {
    /// `public_key` is a PEM-encoded RSA public key; callers needing HMAC
    /// verification should construct the `DecodingKey` differently — RS256
    /// is the only algorithm accepted here, matching the original's
    /// `jwt.decode(token, pubkey, algorithms=["RS256"])`.
    pub fn from_rsa_pem(public_key_pem: &[u8]) -> Result<Self, jsonwebtoken::errors::Error> {
        let decoding_key = DecodingKey::from_rsa_pem(public_key_pem)?;
        let validation = Validation::new(Algorithm::RS256);
        Ok(Self { decoding_key, validation })
    }
}

#[async_trait]
impl TenantProvider for JwtProvider {
    async fn verify(&self, token: Option<&str>) -> Result<TenantId, AuthError> {
        let token = token.ok_or(AuthError::Missing)?;
        let data = decode::<TenantClaims>(token, &self.decoding_key, &self.validation)
            .map_err(|_| AuthError::Invalid)?;

        let claim = data.claims.tenant_id.ok_or(AuthError::Invalid)?;

        claim.parse().map_err(|_| AuthError::Invalid)
    }
}

/// Allows any token (or none) and always resolves to the fixed nil tenant.
/// `AUTH_PROVIDER=local` is the default for development.
pub struct LocalProvider;

#[async_trait]
impl TenantProvider for LocalProvider {
    async fn verify(&self, _token: Option<&str>) -> Result<TenantId, AuthError> {
        Ok(TenantId::NIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_provider_accepts_anything() {
        let provider = LocalProvider;
        assert_eq!(provider.verify(None).await.unwrap(), TenantId::NIL);
        assert_eq!(provider.verify(Some("whatever")).await.unwrap(), TenantId::NIL);
    }
}
