//! Tenant identification (external collaborator, spec.md §4.8).

pub mod middleware;
pub mod providers;

use async_trait::async_trait;
use thiserror::Error;

use crate::ids::TenantId;

pub use middleware::tenant_middleware;
pub use providers::{JwtProvider, LocalProvider};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing credentials")]
    Missing,
    #[error("invalid credentials")]
    Invalid,
}

/// A single function shape the core depends on: verify a bearer token (or
/// its absence) and resolve it to a tenant. Two concrete providers are
/// required without changes to the core (spec.md §4.8); this trait is the
/// seam, grounded on the teacher's `LlmService` trait object pattern in
/// `src/llm.rs`.
#[async_trait]
pub trait TenantProvider: Send + Sync {
    async fn verify(&self, token: Option<&str>) -> Result<TenantId, AuthError>;
}
