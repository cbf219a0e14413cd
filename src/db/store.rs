// src/db/store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        approval::{DigitalSignature, ServiceApproval},
        audit::AuditLogEntry,
        evidence::Evidence,
        order::ServiceOrder,
        payment::ServicePayment,
        settings::ShopSettings,
    },
};

/// Tudo que fecha uma aprovação é gravado numa única unidade atômica.
#[derive(Debug)]
pub struct ApprovalClosing<'a> {
    pub approval: &'a ServiceApproval,
    pub signature: Option<&'a DigitalSignature>,
    /// Documento físico que serve de assinatura (canal documental)
    pub evidence: Option<&'a Evidence>,
    pub audit: &'a [AuditLogEntry],
}

/// Colaborador de persistência. Toda leitura/escrita é escopada por tenant,
/// exceto as buscas públicas por token e por hash de verificação.
#[async_trait]
pub trait Store: Send + Sync {
    // --- ORDENS ---

    async fn next_display_number(&self, tenant_id: Uuid) -> Result<i64, AppError>;

    async fn insert_order(&self, order: &ServiceOrder, audit: &AuditLogEntry) -> Result<(), AppError>;

    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceOrder>, AppError>;

    /// Grava o agregado inteiro se a versão persistida ainda for `expected_version`.
    /// Caso contrário devolve `AppError::Conflict` e nada é escrito.
    async fn save_order(
        &self,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError>;

    // --- AUDITORIA ---

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError>;

    /// Mais recente primeiro.
    async fn list_audit(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<AuditLogEntry>, AppError>;

    // --- APROVAÇÕES ---

    /// Cria a aprovação PENDING junto com a OS já movida para AWAITING_APPROVAL.
    async fn open_approval(
        &self,
        approval: &ServiceApproval,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError>;

    async fn get_approval(&self, tenant_id: Uuid, approval_id: Uuid) -> Result<Option<ServiceApproval>, AppError>;

    async fn find_approval_by_token(&self, token: &str) -> Result<Option<ServiceApproval>, AppError>;

    async fn find_approval_by_hash(&self, verification_hash: &str) -> Result<Option<ServiceApproval>, AppError>;

    async fn latest_approval(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceApproval>, AppError>;

    /// Check-then-set: só grava se a aprovação persistida ainda estiver PENDING,
    /// senão `AppError::AlreadyResponded`.
    async fn close_approval(&self, closing: &ApprovalClosing<'_>) -> Result<(), AppError>;

    /// Único campo mutável depois do fechamento.
    async fn set_receipt_url(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
        receipt_url: &str,
        audit: &AuditLogEntry,
    ) -> Result<(), AppError>;

    async fn get_signature(&self, tenant_id: Uuid, signature_id: Uuid) -> Result<Option<DigitalSignature>, AppError>;

    // --- EVIDÊNCIAS ---

    async fn insert_evidence(&self, evidence: &Evidence, audit: &AuditLogEntry) -> Result<(), AppError>;

    async fn get_evidence(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<Option<Evidence>, AppError>;

    /// Inclui as retiradas, em ordem de upload.
    async fn list_evidence(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<Evidence>, AppError>;

    async fn retire_evidence(
        &self,
        tenant_id: Uuid,
        evidence_id: Uuid,
        retired_at: DateTime<Utc>,
        retired_by: &str,
        audit: &AuditLogEntry,
    ) -> Result<Evidence, AppError>;

    // --- PAGAMENTOS ---

    async fn insert_payment(&self, payment: &ServicePayment, audit: &AuditLogEntry) -> Result<(), AppError>;

    async fn list_payments(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<ServicePayment>, AppError>;

    // --- CONFIGURAÇÕES DA LOJA ---

    async fn get_settings(&self, tenant_id: Uuid) -> Result<ShopSettings, AppError>;

    async fn put_settings(&self, settings: &ShopSettings) -> Result<(), AppError>;
}
