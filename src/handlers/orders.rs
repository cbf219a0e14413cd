// src/handlers/orders.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermOrdersRead, PermOrdersWrite, RequirePermission},
        tenancy::TenantContext,
    },
    models::{
        audit::AuditLogEntry,
        order::{
            ChecklistRequest, CreateOrderRequest, NewItemRequest, OrderDetail, ServiceOrder, TechnicalNotesRequest,
            TransitionOutcome, TransitionRequest, UpdateItemRequest,
        },
    },
};

// POST /api/orders
#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "Orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "OS criada em DRAFT", body = ServiceOrder),
        (status = 400, description = "Dados inválidos")
    ),
    params(
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_order(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = app_state
        .desk
        .create_order(&user.0, tenant.0, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(order)))
}

// GET /api/orders/{order_id}
#[utoipa::path(
    get,
    path = "/api/orders/{order_id}",
    tag = "Orders",
    responses(
        (status = 200, description = "OS com auditoria, evidências, pagamentos e aprovação", body = OrderDetail),
        (status = 404, description = "OS não encontrada")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_order(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let detail = app_state
        .desk
        .order_detail(&user.0, tenant.0, order_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(detail)))
}

// GET /api/orders/{order_id}/audit
#[utoipa::path(
    get,
    path = "/api/orders/{order_id}/audit",
    tag = "Orders",
    responses(
        (status = 200, description = "Auditoria da OS, mais recente primeiro", body = Vec<AuditLogEntry>)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_audit(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let entries = app_state
        .desk
        .list_audit(&user.0, tenant.0, order_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(entries)))
}

// POST /api/orders/{order_id}/transitions
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/transitions",
    tag = "Orders",
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Status alterado", body = TransitionOutcome),
        (status = 422, description = "Transição não permitida"),
        (status = 428, description = "Retirada com saldo em aberto sem confirmação")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn transition_order(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<TransitionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = app_state
        .desk
        .request_transition(&user.0, tenant.0, order_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(outcome)))
}

// =============================================================================
//  ITENS E ANOTAÇÕES
// =============================================================================

// POST /api/orders/{order_id}/items
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/items",
    tag = "Orders",
    request_body = NewItemRequest,
    responses(
        (status = 201, description = "Item incluído", body = ServiceOrder),
        (status = 400, description = "Item inválido ou OS com itens travados")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn add_item(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<NewItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = app_state
        .desk
        .add_item(&user.0, tenant.0, order_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(order)))
}

// PATCH /api/orders/{order_id}/items/{item_id}
#[utoipa::path(
    patch,
    path = "/api/orders/{order_id}/items/{item_id}",
    tag = "Orders",
    request_body = UpdateItemRequest,
    responses(
        (status = 200, description = "Item atualizado", body = ServiceOrder)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("item_id" = Uuid, Path, description = "ID do item"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn update_item(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = app_state
        .desk
        .update_item(&user.0, tenant.0, order_id, item_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(order)))
}

// DELETE /api/orders/{order_id}/items/{item_id}
#[utoipa::path(
    delete,
    path = "/api/orders/{order_id}/items/{item_id}",
    tag = "Orders",
    responses(
        (status = 200, description = "Item removido", body = ServiceOrder)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("item_id" = Uuid, Path, description = "ID do item"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn remove_item(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path((order_id, item_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let order = app_state
        .desk
        .remove_item(&user.0, tenant.0, order_id, item_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(order)))
}

// PUT /api/orders/{order_id}/checklist
#[utoipa::path(
    put,
    path = "/api/orders/{order_id}/checklist",
    tag = "Orders",
    request_body = ChecklistRequest,
    responses(
        (status = 200, description = "Checklist de entrada atualizado", body = ServiceOrder)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_checklist(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<ChecklistRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let order = app_state
        .desk
        .set_checklist(&user.0, tenant.0, order_id, payload.checklist)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(order)))
}

// PUT /api/orders/{order_id}/technical-notes
#[utoipa::path(
    put,
    path = "/api/orders/{order_id}/technical-notes",
    tag = "Orders",
    request_body = TechnicalNotesRequest,
    responses(
        (status = 200, description = "Laudo técnico atualizado", body = ServiceOrder)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn set_technical_notes(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<TechnicalNotesRequest>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale, &app_state.i18n_store))?;

    let order = app_state
        .desk
        .set_technical_notes(&user.0, tenant.0, order_id, payload.technical_notes)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(order)))
}
