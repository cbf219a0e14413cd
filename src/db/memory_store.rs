// src/db/memory_store.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::store::{ApprovalClosing, Store},
    models::{
        approval::{ApprovalStatus, DigitalSignature, ServiceApproval},
        audit::AuditLogEntry,
        evidence::{Evidence, EvidenceLifecycle},
        order::ServiceOrder,
        payment::ServicePayment,
        settings::ShopSettings,
    },
};

#[derive(Default)]
struct MemoryState {
    counters: HashMap<Uuid, i64>,
    orders: HashMap<Uuid, ServiceOrder>,
    audit: Vec<AuditLogEntry>,
    approvals: HashMap<Uuid, ServiceApproval>,
    signatures: HashMap<Uuid, DigitalSignature>,
    evidence: HashMap<Uuid, Evidence>,
    payments: Vec<ServicePayment>,
    settings: HashMap<Uuid, ShopSettings>,
}

/// Store em memória: testes e execução sem DATABASE_URL.
/// Cada operação roda sob um único write lock, o que a torna atômica.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn next_display_number(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        let mut state = self.state.write().await;
        let counter = state.counters.entry(tenant_id).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn insert_order(&self, order: &ServiceOrder, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id) {
            return Err(AppError::Conflict(format!("OS {} já existe", order.id)));
        }
        state.orders.insert(order.id, order.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceOrder>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&order_id)
            .filter(|order| order.tenant_id == tenant_id)
            .cloned())
    }

    async fn save_order(
        &self,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        check_order_version(&state, order, expected_version)?;

        state.orders.insert(order.id, order.clone());
        state.audit.extend(audit.iter().cloned());
        Ok(())
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        self.state.write().await.audit.push(entry.clone());
        Ok(())
    }

    async fn list_audit(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<AuditLogEntry>, AppError> {
        let state = self.state.read().await;
        let mut entries: Vec<AuditLogEntry> = state
            .audit
            .iter()
            .rev()
            .filter(|entry| entry.tenant_id == tenant_id && entry.order_id == Some(order_id))
            .cloned()
            .collect();
        // Estável: empates de timestamp mantêm a ordem reversa de inserção
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(entries)
    }

    async fn open_approval(
        &self,
        approval: &ServiceApproval,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        check_order_version(&state, order, expected_version)?;

        let has_pending = state
            .approvals
            .values()
            .any(|existing| existing.order_id == approval.order_id && existing.is_pending());
        if has_pending {
            return Err(AppError::Conflict(format!(
                "OS {} já possui aprovação pendente",
                approval.order_id
            )));
        }

        state.approvals.insert(approval.id, approval.clone());
        state.orders.insert(order.id, order.clone());
        state.audit.extend(audit.iter().cloned());
        Ok(())
    }

    async fn get_approval(&self, tenant_id: Uuid, approval_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .approvals
            .get(&approval_id)
            .filter(|approval| approval.tenant_id == tenant_id)
            .cloned())
    }

    async fn find_approval_by_token(&self, token: &str) -> Result<Option<ServiceApproval>, AppError> {
        let state = self.state.read().await;
        Ok(state.approvals.values().find(|a| a.token == token).cloned())
    }

    async fn find_approval_by_hash(&self, verification_hash: &str) -> Result<Option<ServiceApproval>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .approvals
            .values()
            .find(|a| a.verification_hash.as_deref() == Some(verification_hash))
            .cloned())
    }

    async fn latest_approval(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .approvals
            .values()
            .filter(|a| a.tenant_id == tenant_id && a.order_id == order_id)
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn close_approval(&self, closing: &ApprovalClosing<'_>) -> Result<(), AppError> {
        let mut state = self.state.write().await;

        let stored_status = state
            .approvals
            .get(&closing.approval.id)
            .filter(|a| a.tenant_id == closing.approval.tenant_id)
            .map(|a| a.status)
            .ok_or_else(|| AppError::not_found(format!("Aprovação {}", closing.approval.id)))?;

        if stored_status != ApprovalStatus::Pending {
            return Err(AppError::AlreadyResponded);
        }

        state.approvals.insert(closing.approval.id, closing.approval.clone());
        if let Some(signature) = closing.signature {
            state.signatures.insert(signature.id, signature.clone());
        }
        if let Some(evidence) = closing.evidence {
            state.evidence.insert(evidence.id, evidence.clone());
        }
        state.audit.extend(closing.audit.iter().cloned());
        Ok(())
    }

    async fn set_receipt_url(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
        receipt_url: &str,
        audit: &AuditLogEntry,
    ) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        let approval = state
            .approvals
            .get_mut(&approval_id)
            .filter(|a| a.tenant_id == tenant_id && !a.is_pending())
            .ok_or_else(|| AppError::not_found(format!("Aprovação respondida {approval_id}")))?;

        approval.receipt_url = Some(receipt_url.to_string());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn get_signature(&self, tenant_id: Uuid, signature_id: Uuid) -> Result<Option<DigitalSignature>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .signatures
            .get(&signature_id)
            .filter(|s| s.tenant_id == tenant_id)
            .cloned())
    }

    async fn insert_evidence(&self, evidence: &Evidence, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.evidence.insert(evidence.id, evidence.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn get_evidence(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<Option<Evidence>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .evidence
            .get(&evidence_id)
            .filter(|e| e.tenant_id == tenant_id)
            .cloned())
    }

    async fn list_evidence(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<Evidence>, AppError> {
        let state = self.state.read().await;
        let mut evidence: Vec<Evidence> = state
            .evidence
            .values()
            .filter(|e| e.tenant_id == tenant_id && e.order_id == order_id)
            .cloned()
            .collect();
        evidence.sort_by_key(|e| e.uploaded_at);
        Ok(evidence)
    }

    async fn retire_evidence(
        &self,
        tenant_id: Uuid,
        evidence_id: Uuid,
        retired_at: DateTime<Utc>,
        retired_by: &str,
        audit: &AuditLogEntry,
    ) -> Result<Evidence, AppError> {
        let mut state = self.state.write().await;
        let evidence = state
            .evidence
            .get_mut(&evidence_id)
            .filter(|e| e.tenant_id == tenant_id)
            .ok_or_else(|| AppError::not_found(format!("Evidência {evidence_id}")))?;

        if evidence.lifecycle != EvidenceLifecycle::Active {
            return Err(AppError::Conflict(format!("Evidência {evidence_id} já foi retirada")));
        }

        evidence.lifecycle = EvidenceLifecycle::Retired;
        evidence.retired_at = Some(retired_at);
        evidence.retired_by = Some(retired_by.to_string());
        let retired = evidence.clone();

        state.audit.push(audit.clone());
        Ok(retired)
    }

    async fn insert_payment(&self, payment: &ServicePayment, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut state = self.state.write().await;
        state.payments.push(payment.clone());
        state.audit.push(audit.clone());
        Ok(())
    }

    async fn list_payments(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<ServicePayment>, AppError> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .iter()
            .filter(|p| p.tenant_id == tenant_id && p.order_id == order_id)
            .cloned()
            .collect())
    }

    async fn get_settings(&self, tenant_id: Uuid) -> Result<ShopSettings, AppError> {
        let state = self.state.read().await;
        Ok(state
            .settings
            .get(&tenant_id)
            .cloned()
            .unwrap_or_else(|| ShopSettings::empty(tenant_id)))
    }

    async fn put_settings(&self, settings: &ShopSettings) -> Result<(), AppError> {
        self.state
            .write()
            .await
            .settings
            .insert(settings.tenant_id, settings.clone());
        Ok(())
    }
}

fn check_order_version(state: &MemoryState, order: &ServiceOrder, expected_version: i64) -> Result<(), AppError> {
    let stored = state
        .orders
        .get(&order.id)
        .filter(|stored| stored.tenant_id == order.tenant_id)
        .ok_or_else(|| AppError::not_found(format!("OS {}", order.id)))?;

    if stored.version != expected_version {
        return Err(AppError::Conflict(format!(
            "OS {} mudou (versão {} != {})",
            order.id, stored.version, expected_version
        )));
    }
    Ok(())
}
