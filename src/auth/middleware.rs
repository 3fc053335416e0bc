//! Axum middleware that extracts `Authorization: Bearer <token>`, verifies
//! it against the configured provider, and stashes the resulting tenant as
//! a request extension (spec.md §6 "Authentication").

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::{AuthError, TenantProvider};

fn bearer_token(req: &Request<Body>) -> Option<&str> {
    let header = req.headers().get(axum::http::header::AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").or_else(|| header.strip_prefix("bearer "))
}

pub async fn tenant_middleware(
    State(provider): State<Arc<dyn TenantProvider>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = bearer_token(&req);
    match provider.verify(token).await {
        Ok(tenant_id) => {
            req.extensions_mut().insert(tenant_id);
            next.run(req).await
        }
        Err(AuthError::Missing) => (StatusCode::UNAUTHORIZED, "missing credentials").into_response(),
        Err(AuthError::Invalid) => (StatusCode::UNAUTHORIZED, "invalid credentials").into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_token_strips_prefix() {
        let req = Request::builder()
            .header(axum::http::header::AUTHORIZATION, "Bearer abc123")
            .body(Body::empty())
            .unwrap();
        assert_eq!(bearer_token(&req), Some("abc123"));
    }

    #[test]
    fn bearer_token_absent_without_header() {
        let req = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(bearer_token(&req), None);
    }
}
