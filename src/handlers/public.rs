// src/handlers/public.rs

// Rotas sem login: o token da aprovação ou o hash do comprovante bastam.

use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{client::ClientInfo, i18n::Locale},
    models::approval::{ApprovalResult, ApprovalView, SubmitDecisionRequest, VerificationReport},
};

// GET /api/public/approvals/{token}
#[utoipa::path(
    get,
    path = "/api/public/approvals/{token}",
    tag = "Public",
    responses(
        (status = 200, description = "Orçamento a ser aprovado pelo cliente", body = ApprovalView),
        (status = 404, description = "Link inválido")
    ),
    params(
        ("token" = String, Path, description = "Token do link de aprovação")
    )
)]
pub async fn get_approval_by_token(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(token): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let view = app_state
        .desk
        .get_approval_by_token(&token)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(view)))
}

// POST /api/public/approvals/{token}/decision
#[utoipa::path(
    post,
    path = "/api/public/approvals/{token}/decision",
    tag = "Public",
    request_body = SubmitDecisionRequest,
    responses(
        (status = 200, description = "Resposta registrada", body = ApprovalResult),
        (status = 409, description = "Aprovação já respondida"),
        (status = 503, description = "Comprovante não pôde ser gerado; tente novamente")
    ),
    params(
        ("token" = String, Path, description = "Token do link de aprovação")
    )
)]
pub async fn submit_approval_decision(
    State(app_state): State<AppState>,
    locale: Locale,
    ClientInfo(client): ClientInfo,
    Path(token): Path<String>,
    Json(payload): Json<SubmitDecisionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let result = app_state
        .desk
        .submit_approval_decision(&token, payload, client)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(result)))
}

// GET /api/public/verify/{hash}
#[utoipa::path(
    get,
    path = "/api/public/verify/{hash}",
    tag = "Public",
    responses(
        (status = 200, description = "Resultado da conferência do comprovante", body = VerificationReport),
        (status = 404, description = "Hash desconhecido")
    ),
    params(
        ("hash" = String, Path, description = "Hash impresso no comprovante")
    )
)]
pub async fn verify_receipt(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let report = app_state
        .desk
        .verify(&hash)
        .await
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    Ok((StatusCode::OK, Json(report)))
}

// GET /files/{*key}
pub async fn serve_file(
    State(app_state): State<AppState>,
    locale: Locale,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let blob = app_state
        .blobs
        .get(&key)
        .await
        .and_then(|blob| blob.ok_or_else(|| AppError::not_found(format!("arquivo {key}"))))
        .map_err(|e| e.to_api_error(&locale, &app_state.i18n_store))?;

    let headers = [(header::CONTENT_TYPE, blob.content_type)];
    Ok((headers, blob.bytes).into_response())
}
