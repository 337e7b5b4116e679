//! Tenant identity for admin requests.
//!
//! Authentication itself lives outside this crate: the embedding
//! application verifies the bearer token and inserts a [`TenantContext`]
//! into the request extensions. Handlers extract it; a missing context is
//! a 401.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::WebhookError;

/// The authenticated principal's tenant, as resolved by the outer auth
/// layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TenantContext {
    pub tenant_id: Uuid,
}

impl TenantContext {
    #[must_use]
    pub fn new(tenant_id: Uuid) -> Self {
        Self { tenant_id }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = WebhookError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .copied()
            .ok_or(WebhookError::Unauthorized)
    }
}
