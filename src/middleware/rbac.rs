// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::AppError,
    middleware::auth::AuthenticatedUser,
    models::auth::{
        PERM_APPROVALS_WRITE, PERM_EVIDENCE_WRITE, PERM_ORDERS_READ, PERM_ORDERS_WRITE, PERM_PAYMENTS_WRITE,
    },
};

/// Permissão funcional exigida por uma rota, identificada pelo slug.
pub trait PermissionDef: Send + Sync + 'static {
    fn slug() -> &'static str;
}

/// Extrator que barra a requisição quando o principal não tem a permissão `T`.
pub struct RequirePermission<T>(pub PhantomData<T>);

impl<T, S> FromRequestParts<S> for RequirePermission<T>
where
    T: PermissionDef,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = parts
            .extensions
            .get::<AuthenticatedUser>()
            .ok_or(AppError::InvalidToken)?;

        let required_perm = T::slug();
        if !user.0.has_permission(required_perm) {
            return Err(AppError::Forbidden(format!(
                "é necessária a permissão '{required_perm}'"
            )));
        }

        Ok(RequirePermission(PhantomData))
    }
}

// --- Permissões usadas pelas rotas da equipe ---

pub struct PermOrdersRead;
impl PermissionDef for PermOrdersRead {
    fn slug() -> &'static str { PERM_ORDERS_READ }
}

pub struct PermOrdersWrite;
impl PermissionDef for PermOrdersWrite {
    fn slug() -> &'static str { PERM_ORDERS_WRITE }
}

pub struct PermApprovalsWrite;
impl PermissionDef for PermApprovalsWrite {
    fn slug() -> &'static str { PERM_APPROVALS_WRITE }
}

pub struct PermEvidenceWrite;
impl PermissionDef for PermEvidenceWrite {
    fn slug() -> &'static str { PERM_EVIDENCE_WRITE }
}

pub struct PermPaymentsWrite;
impl PermissionDef for PermPaymentsWrite {
    fn slug() -> &'static str { PERM_PAYMENTS_WRITE }
}
