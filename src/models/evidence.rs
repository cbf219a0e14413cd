// src/models/evidence.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "evidence_stage", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceStage {
    Entrada,
    Diagnostico,
    Processo,
    Finalizacao,
    Entrega,
    AprovacaoDocumental,
}

impl EvidenceStage {
    /// Ordem de declaração, usada para agrupar na exibição.
    pub const ALL: [EvidenceStage; 6] = [
        EvidenceStage::Entrada,
        EvidenceStage::Diagnostico,
        EvidenceStage::Processo,
        EvidenceStage::Finalizacao,
        EvidenceStage::Entrega,
        EvidenceStage::AprovacaoDocumental,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EvidenceStage::Entrada => "ENTRADA",
            EvidenceStage::Diagnostico => "DIAGNOSTICO",
            EvidenceStage::Processo => "PROCESSO",
            EvidenceStage::Finalizacao => "FINALIZACAO",
            EvidenceStage::Entrega => "ENTREGA",
            EvidenceStage::AprovacaoDocumental => "APROVACAO_DOCUMENTAL",
        }
    }
}

impl std::str::FromStr for EvidenceStage {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EvidenceStage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| format!("etapa de evidência desconhecida: {value}"))
    }
}

/// Exclusão lógica: o registro e o hash nunca saem do banco.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "evidence_lifecycle", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvidenceLifecycle {
    Active,
    Retired,
    PurgeEligible,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    pub stage: EvidenceStage,
    pub url: String,
    #[serde(skip_serializing)]
    pub storage_key: String,
    #[schema(example = "Foto da tela ao receber o aparelho")]
    pub description: String,
    #[schema(example = "9f86d081884c7d659a2feaa0c55ad015a3bf4f1b2b0b822cd15d6c15b0f00a08")]
    pub file_hash: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub lifecycle: EvidenceLifecycle,
    pub retired_at: Option<DateTime<Utc>>,
    pub retired_by: Option<String>,
}

impl Evidence {
    pub fn is_active(&self) -> bool {
        self.lifecycle == EvidenceLifecycle::Active
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceGroup {
    pub stage: EvidenceStage,
    pub items: Vec<Evidence>,
}

/// Arquivo recebido (multipart) antes de virar evidência.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvidenceCheck {
    pub evidence_id: Uuid,
    pub stored_hash: String,
    pub computed_hash: String,
    pub matches: bool,
}
