// src/handlers/evidence.rs

use std::collections::HashMap;

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
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{PermEvidenceWrite, PermOrdersRead, RequirePermission},
        tenancy::TenantContext,
    },
    models::evidence::{Evidence, EvidenceCheck, EvidenceStage, UploadedFile},
};

/// Formulário multipart: um arquivo (`file`) e campos de texto.
#[derive(Debug, Default)]
pub struct UploadForm {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| AppError::invalid("file", e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();

            if name == "file" {
                let file_name = field.file_name().unwrap_or("arquivo").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::invalid("file", e.body_text()))?;

                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            } else {
                let value = field.text().await.map_err(|e| AppError::invalid(&name, e.body_text()))?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    pub fn take_file(&mut self) -> Result<UploadedFile, AppError> {
        self.file
            .take()
            .ok_or_else(|| AppError::invalid("file", "arquivo obrigatório"))
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

// Só para a documentação do Swagger
#[derive(ToSchema)]
#[allow(dead_code)]
pub struct EvidenceUploadForm {
    #[schema(value_type = String, format = Binary)]
    file: Vec<u8>,
    #[schema(example = "ENTRADA")]
    stage: EvidenceStage,
    #[schema(example = "Tela trincada no canto superior")]
    description: Option<String>,
}

// POST /api/orders/{order_id}/evidence
#[utoipa::path(
    post,
    path = "/api/orders/{order_id}/evidence",
    tag = "Evidence",
    request_body(content = EvidenceUploadForm, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Evidência anexada", body = Evidence),
        (status = 400, description = "Arquivo ausente, vazio ou grande demais")
    ),
    params(
        ("order_id" = Uuid, Path, description = "ID da OS"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn upload_evidence(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermEvidenceWrite>,
    Path(order_id): Path<Uuid>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let to_api = |e: AppError| e.to_api_error(&locale, &app_state.i18n_store);

    let mut form = UploadForm::read(multipart).await.map_err(to_api)?;
    let file = form.take_file().map_err(to_api)?;
    let stage = form
        .text("stage")
        .ok_or_else(|| AppError::invalid("stage", "etapa obrigatória"))
        .and_then(|s| s.parse::<EvidenceStage>().map_err(|e| AppError::invalid("stage", e)))
        .map_err(to_api)?;
    let description = form.text("description").unwrap_or_default().to_string();

    let evidence = app_state
        .desk
        .upload_evidence(&user.0, tenant.0, order_id, file, stage, &description)
        .await
        .map_err(to_api)?;

    Ok((StatusCode::CREATED, Json(evidence)))
}

// GET /api/evidence/{evidence_id}
#[utoipa::path(
    get,
    path = "/api/evidence/{evidence_id}",
    tag = "Evidence",
    responses(
        (status = 200, description = "Evidência (inclusive retiradas)", body = Evidence),
        (status = 404, description = "Evidência não encontrada")
    ),
    params(
        ("evidence_id" = Uuid, Path, description = "ID da evidência"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_evidence(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(evidence_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let evidence = app_state
        .desk
        .get_evidence(&user.0, tenant.0, evidence_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(evidence)))
}

// DELETE /api/evidence/{evidence_id}
#[utoipa::path(
    delete,
    path = "/api/evidence/{evidence_id}",
    tag = "Evidence",
    responses(
        (status = 200, description = "Evidência retirada (exclusão lógica)", body = Evidence),
        (status = 403, description = "Sem permissão; a tentativa fica registrada")
    ),
    params(
        ("evidence_id" = Uuid, Path, description = "ID da evidência"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn retire_evidence(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    Path(evidence_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    // A permissão é checada no serviço para que a negativa entre na auditoria
    let evidence = app_state
        .desk
        .retire_evidence(&user.0, tenant.0, evidence_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(evidence)))
}

// GET /api/evidence/{evidence_id}/verify
#[utoipa::path(
    get,
    path = "/api/evidence/{evidence_id}/verify",
    tag = "Evidence",
    responses(
        (status = 200, description = "Comparação do hash gravado com o binário", body = EvidenceCheck)
    ),
    params(
        ("evidence_id" = Uuid, Path, description = "ID da evidência"),
        ("x-tenant-id" = Uuid, Header, description = "ID da Loja")
    ),
    security(("api_jwt" = []))
)]
pub async fn verify_evidence(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    tenant: TenantContext,
    _perm: RequirePermission<PermOrdersRead>,
    Path(evidence_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let check = app_state
        .desk
        .verify_evidence(&user.0, tenant.0, evidence_id)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(check)))
}
