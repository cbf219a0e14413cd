// src/middleware/tenancy.rs

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::{common::error::AppError, middleware::auth::AuthenticatedUser};

// O nome do nosso cabeçalho HTTP customizado
const TENANT_ID_HEADER: &str = "x-tenant-id";

// A loja em que a requisição atua
#[derive(Debug, Clone, Copy)]
pub struct TenantContext(pub Uuid);

fn tenant_from_parts(parts: &Parts) -> Result<Uuid, AppError> {
    let value = parts
        .headers
        .get(TENANT_ID_HEADER)
        .ok_or_else(|| AppError::invalid(TENANT_ID_HEADER, "cabeçalho obrigatório"))?;

    let value_str = value
        .to_str()
        .map_err(|_| AppError::invalid(TENANT_ID_HEADER, "contém caracteres inválidos"))?;

    Uuid::parse_str(value_str.trim()).map_err(|_| AppError::invalid(TENANT_ID_HEADER, "não é um UUID"))
}

/// Roda depois do `auth_guard`: o principal só atua na própria loja (exceto SuperAdmin).
pub async fn tenant_guard(request: Request, next: Next) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();

    let tenant_id = tenant_from_parts(&parts)?;
    let user = parts
        .extensions
        .get::<AuthenticatedUser>()
        .ok_or(AppError::InvalidToken)?;

    if !user.0.can_access_tenant(tenant_id) {
        tracing::warn!("🚫 {} tentou acessar a loja {}", user.0.id, tenant_id);
        return Err(AppError::Forbidden(format!("sem acesso à loja {tenant_id}")));
    }

    parts.extensions.insert(TenantContext(tenant_id));
    Ok(next.run(Request::from_parts(parts, body)).await)
}

impl<S> FromRequestParts<S> for TenantContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<TenantContext>() {
            Some(context) => Ok(*context),
            None => tenant_from_parts(parts).map(TenantContext),
        }
    }
}
