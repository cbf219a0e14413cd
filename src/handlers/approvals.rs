// src/handlers/approvals.rs

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    handlers::evidence::UploadForm,
    middleware::{
        auth::AuthenticatedUser,
        client::ClientInfo,
        i18n::Locale,
        rbac::{PermApprovalsWrite, PermOrdersRead, RequirePermission},
        tenancy::TenantContext,
    },
    models::approval::{
        ApprovalResult, ApprovalToken, CreateApprovalRequest, InPersonApprovalRequest, InPersonRejectionRequest,
        ItemSelection, ServiceApproval,
    },
};

// POST /api/orders/{order_id}/approvals
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/approvals",
    tag = "Approvals",
    request_body = CreateApprovalRequest,
    responses(
        (status = 201, description = "Aprovação aberta e link enviado ao cliente", body = ApprovalToken),
        (status = 409, description = "Já existe aprovação pendente"),
        (status = 422, description = "OS não pode aguardar aprovação no status atual")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn create_approval_request(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermApprovalsWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<CreateApprovalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let token = app_state
        .desk
        .create_approval_request(&user.0, tenant.0, order_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::CREATED, Json(token)))
}

// POST /api/orders/{order_id}/approvals/in-person
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/approvals/in-person",
    tag = "Approvals",
    request_body = InPersonApprovalRequest,
    responses(
        (status = 200, description = "Aprovação presencial registrada", body = ApprovalResult),
        (status = 503, description = "Comprovante não pôde ser gerado; nada foi gravado")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_in_person_approval(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermApprovalsWrite>,
    ClientInfo(client): ClientInfo,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<InPersonApprovalRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = app_state
        .desk
        .register_in_person_approval(&user.0, tenant.0, order_id, payload, client)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(result)))
}

// POST /api/orders/{order_id}/approvals/in-person/rejection
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/approvals/in-person/rejection",
    tag = "Approvals",
    request_body = InPersonRejectionRequest,
    responses(
        (status = 200, description = "Recusa presencial registrada", body = ApprovalResult)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_in_person_rejection(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermApprovalsWrite>,
    Path(order_id): Path<Uuid>,
    Json(payload): Json<InPersonRejectionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = app_state
        .desk
        .register_in_person_rejection(&user.0, tenant.0, order_id, payload)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(result)))
}

// Só para a documentação do Swagger
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct PhysicalApprovalForm {
    /// Foto ou scan do termo assinado
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    /// JSON: `[{"itemId": "...", "approved": false}]`
    selections: Option<String>,
    #[schema(example = "Maria Souza")]
    signer_name: Option<String>,
}

// POST /api/orders/{order_id}/approvals/physical
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/approvals/physical",
    tag = "Approvals",
    request_body(content = PhysicalApprovalForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, description = "Aprovação por documento físico registrada", body = ApprovalResult)
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_physical_approval(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermApprovalsWrite>,
    Path(order_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let to_api = |e: AppError| e.to_api_error(&locale, &app_state.i18n_store);

    let mut form = UploadForm::read(multipart).await.map_err(to_api)?;
    let document = form.take_file().map_err(to_api)?;
    let selections: Vec<ItemSelection> = match form.text("selections") {
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| AppError::invalid("selections", e.to_string()))
            .map_err(to_api)?,
        None => Vec::new(),
    };
    let signer_name = form.text("signerName").map(str::to_string);

    let result = app_state
        .desk
        .register_physical_approval(&user.0, tenant.0, order_id, selections, document, signer_name)
        .await
        .map_err(to_api)?;

    Ok((StatusCode::OK, Json(result)))
}

// GET /api/approvals/{approval_id}
#[utoipa::path(
    get,
    path = "/api/approvals/{approval_id}",
    tag = "Approvals",
    responses(
        (status = 200, description = "Registro de aprovação", body = ServiceApproval)
    ),
    params(
        ("approval_id" = Uuid, Path, description = "ID da aprovação"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_approval(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(approval_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let approval = app_state
        .desk
        .get_approval(&user.0, tenant.0, approval_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(approval)))
}

// POST /api/approvals/{approval_id}/receipt
#[utoipa::path(
    post,
    path = "/api/approvals/{approval_id}/receipt",
    tag = "Approvals",
    responses(
        (status = 200, description = "Comprovante regenerado", body = ServiceApproval),
        (status = 503, description = "Registro não confere com o hash gravado")
    ),
    params(
        ("approval_id" = Uuid, Path, description = "ID da aprovação"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn regenerate_receipt(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermApprovalsWrite>,
    Path(approval_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let approval = app_state
        .desk
        .regenerate_receipt(&user.0, tenant.0, approval_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(approval)))
}
