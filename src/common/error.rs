// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::{
    common::i18n::I18nStore,
    middleware::i18n::Locale,
    models::{evidence::EvidenceStage, order::OrderStatus},
};

// Taxonomia de erros do núcleo. Todos voltam como Result tipado, nunca são engolidos.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Transição inválida: {from} -> {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Esta aprovação já foi respondida")]
    AlreadyResponded,

    #[error("Campo inválido '{field}': {message}")]
    InvalidField { field: String, message: String },

    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Falha de integridade: {0}")]
    IntegrityFailure(String),

    #[error("Recurso não encontrado: {0}")]
    ResourceNotFound(String),

    #[error("Acesso negado: {0}")]
    Forbidden(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Conflito de escrita concorrente: {0}")]
    Conflict(String),

    #[error("Retirada com saldo em aberto ({balance}) exige confirmação")]
    UnderpaidWithdrawal { balance: Decimal },

    #[error("Evidências obrigatórias ausentes para {target}: {missing:?}")]
    MissingEvidence { target: OrderStatus, missing: Vec<EvidenceStage> },

    // Variante para erros de banco de dados
    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    // Variante genérica para qualquer outro erro inesperado
    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

impl AppError {
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        AppError::InvalidField {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        AppError::ResourceNotFound(what.into())
    }

    /// Código estável, usado como chave de tradução e no corpo da resposta.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidTransition { .. } => "INVALID_TRANSITION",
            AppError::AlreadyResponded => "ALREADY_RESPONDED",
            AppError::InvalidField { .. } | AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::IntegrityFailure(_) => "INTEGRITY_FAILURE",
            AppError::ResourceNotFound(_) => "NOT_FOUND",
            AppError::Forbidden(_) => "FORBIDDEN",
            AppError::InvalidToken | AppError::JwtError(_) => "INVALID_TOKEN",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UnderpaidWithdrawal { .. } => "UNDERPAID_WITHDRAWAL",
            AppError::MissingEvidence { .. } => "MISSING_EVIDENCE",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AlreadyResponded | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::InvalidField { .. } | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::IntegrityFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidToken | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::UnderpaidWithdrawal { .. } => StatusCode::PRECONDITION_REQUIRED,
            AppError::MissingEvidence { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::InvalidTransition { from, to } => Some(json!({ "from": from, "to": to })),
            AppError::InvalidField { field, message } => Some(json!({ field: [message] })),
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::UnderpaidWithdrawal { balance } => Some(json!({ "balance": balance })),
            AppError::MissingEvidence { missing, .. } => Some(json!({ "missing": missing })),
            AppError::ResourceNotFound(what)
            | AppError::Forbidden(what)
            | AppError::Conflict(what)
            | AppError::IntegrityFailure(what) => Some(json!({ "reason": what })),
            _ => None,
        }
    }

    /// Converte para a resposta HTTP, com a mensagem no idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, i18n: &I18nStore) -> ApiError {
        let status = self.status();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // O `tracing` registra o detalhe; o cliente recebe só a mensagem genérica.
            tracing::error!("Erro Interno do Servidor: {:?}", self);
        }

        ApiError {
            status,
            code: self.code(),
            error: i18n.translate(&locale.0, self.code()),
            details: if status == StatusCode::INTERNAL_SERVER_ERROR { None } else { self.details() },
        }
    }
}

/// Resposta de erro serializada para o cliente.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub code: &'static str,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            code,
            error: error.into(),
            details: None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status;
        (status, Json(self)).into_response()
    }
}

// Usado pelos middlewares, que não têm o Locale em mãos.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default(), &I18nStore::default())
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_hide_details() {
        let err = AppError::InternalServerError(anyhow::anyhow!("senha do banco vazou"));
        let api = err.to_api_error(&Locale("pt".into()), &I18nStore::default());

        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(api.details.is_none());
        assert!(!api.error.contains("senha"));
    }

    #[test]
    fn already_responded_maps_to_conflict() {
        let api = AppError::AlreadyResponded.to_api_error(&Locale("en".into()), &I18nStore::default());
        assert_eq!(api.status, StatusCode::CONFLICT);
        assert_eq!(api.code, "ALREADY_RESPONDED");
    }
}
