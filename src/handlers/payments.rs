// src/handlers/payments.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermOrdersRead, PermPaymentsWrite, RequirePermission},
        tenancy::TenantContext,
    },
    models::payment::{PaymentOutcome, PaymentSummary, RecordPaymentRequest, ServicePayment},
};

// POST /api/orders/{order_id}/payments
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/payments",
    tag = "Payments",
    request_body = RecordPaymentRequest,
    responses(
        (status = 201, description = "Pagamento registrado", body = PaymentOutcome),
        (status = 400, description = "Valor inválido ou OS encerrada")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn record_payment(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermPaymentsWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<RecordPaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = app_state
        .desk
        .record_payment(&user.0, tenant.0, order_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(outcome)))
}

// GET /api/orders/{order_id}/payments
#[utoipa::path(
    get,
    path = "/api/orders/{order_id}/payments",
    tag = "Payments",
    responses(
        (status = 200, description = "Pagamentos da OS", body = Vec<ServicePayment>)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_payments(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let payments = app_state
        .desk
        .list_payments(&user.0, tenant.0, order_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(payments)))
}

// GET /api/orders/{order_id}/payments/summary
#[utoipa::path(
    get,
    path = "/api/orders/{order_id}/payments/summary",
    tag = "Payments",
    responses(
        (status = 200, description = "Total aprovado, pago e saldo", body = PaymentSummary)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn payment_summary(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(order_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let summary = app_state
        .desk
        .payment_summary(&user.0, tenant.0, order_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(summary)))
}
