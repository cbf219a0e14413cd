// src/models/approval.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::order::{OrderStatus, ServiceItem};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "approval_channel", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalChannel {
    RemoteLink,       // Link enviado ao cliente
    InPerson,         // Assinatura colhida no balcão
    PhysicalDocument, // Termo em papel fotografado/escaneado
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalDecision {
    Approve,
    PartialApprove,
    Reject,
}

// --- Structs ---

/// Registro de autorização. `items_snapshot` é uma cópia do momento da solicitação
/// e nunca acompanha edições posteriores da OS.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceApproval {
    pub id: Uuid,
    pub order_id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[serde(skip_serializing)]
    pub token: String,
    #[schema(example = "Tela trincada e bateria estufada. Troca recomendada.")]
    pub description: String,
    #[sqlx(json)]
    pub items_snapshot: Vec<ServiceItem>,
    pub total_value: Decimal,
    pub status: ApprovalStatus,
    pub channel: Option<ApprovalChannel>,
    pub requested_by: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub digital_signature_id: Option<Uuid>,
    pub receipt_url: Option<String>,
    pub verification_hash: Option<String>,
    pub warranty_terms: Option<String>,
}

impl ServiceApproval {
    pub fn is_pending(&self) -> bool {
        self.status == ApprovalStatus::Pending
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SignatureArtifact {
    /// Assinatura desenhada (data URL `data:image/png;base64,...`)
    Drawn {
        #[serde(rename = "imageDataUrl")]
        image_data_url: String,
    },
    /// O documento físico assinado ocupa o lugar da assinatura
    PhysicalDocument {
        #[serde(rename = "evidenceId")]
        evidence_id: Uuid,
        #[serde(rename = "documentUrl")]
        document_url: String,
        #[serde(rename = "fileHash")]
        file_hash: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DigitalSignature {
    pub id: Uuid,
    pub approval_id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[sqlx(json)]
    pub artifact: SignatureArtifact,
    pub signer_name: String,
    pub signer_document: Option<String>,
    pub terms_accepted: bool,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
    pub signed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ItemSelection {
    pub item_id: Uuid,
    pub approved: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignaturePayload {
    #[validate(length(min = 2, max = 120, message = "required"))]
    #[schema(example = "Maria Souza")]
    pub signer_name: String,

    #[validate(length(max = 32))]
    pub signer_document: Option<String>,

    #[validate(length(min = 1, message = "required"))]
    #[schema(example = "data:image/png;base64,iVBORw0KGgo...")]
    pub signature_image: String,

    pub terms_accepted: bool,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateApprovalRequest {
    /// Vazio = todos os itens da OS
    #[serde(default)]
    pub item_ids: Vec<Uuid>,

    #[validate(length(min = 1, max = 4000, message = "required"))]
    pub description: String,
}

/// Resposta do cliente pelo link público.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitDecisionRequest {
    pub decision: ApprovalDecision,

    #[serde(default)]
    pub selections: Vec<ItemSelection>,

    #[validate(nested)]
    pub signature: Option<SignaturePayload>,

    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InPersonApprovalRequest {
    #[serde(default)]
    pub selections: Vec<ItemSelection>,

    #[validate(nested)]
    pub signature: SignaturePayload,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InPersonRejectionRequest {
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

/// Metadados de rede do cliente no momento do aceite.
#[derive(Debug, Clone, Default)]
pub struct ClientMetadata {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalToken {
    pub approval_id: Uuid,
    pub token: String,
    #[schema(example = "https://os.minhaloja.com/aprovacao/9f1c...")]
    pub link: String,
}

// Visão pública servida pelo link de aprovação
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalView {
    pub approval_id: Uuid,
    pub order_number: i64,
    pub shop_name: Option<String>,
    pub customer_name: String,
    pub device: String,
    pub description: String,
    pub items: Vec<ServiceItem>,
    pub total_value: Decimal,
    pub status: ApprovalStatus,
    pub responded_at: Option<DateTime<Utc>>,
    pub warranty_terms: Option<String>,
    pub receipt_url: Option<String>,
    pub verification_hash: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalResult {
    pub approval: ServiceApproval,
    pub signature: Option<DigitalSignature>,
    pub order_status: OrderStatus,
    pub partial: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VerificationReport {
    pub matches: bool,
    pub verification_hash: String,
    pub order_id: Uuid,
    pub order_number: i64,
    pub customer_name: String,
    pub device: String,
    pub total_value: Decimal,
    pub signer_name: Option<String>,
    pub responded_at: Option<DateTime<Utc>>,
    pub approval_status: ApprovalStatus,
}
