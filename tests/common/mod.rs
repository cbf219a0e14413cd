// tests/common/mod.rs

#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use ordem_servico::{
    common::{clock::ManualClock, error::AppError},
    db::{blob_storage::StoredBlob, ApprovalClosing, BlobStorage, MemoryBlobStorage, MemoryStore, Store},
    models::{
        approval::{DigitalSignature, ServiceApproval, SignaturePayload},
        audit::AuditLogEntry,
        auth::{Principal, Role},
        evidence::Evidence,
        order::{CreateOrderRequest, CustomerPayload, ItemKind, NewItemRequest, OrderStatus, ServiceOrder, Severity, TransitionRequest},
        payment::ServicePayment,
        settings::{ShopSettings, UpdateSettingsRequest},
    },
    services::{
        evidence_policy::{EvidencePolicy, PolicyMode},
        notification::{Notification, Notifier},
        order_desk::{Collaborators, DeskSettings, OrderDesk},
        receipt_service::{ReceiptData, ReceiptRenderer},
    },
};

pub const BASE_URL: &str = "https://os.loja.test";
pub const WARRANTY: &str = "Garantia de 90 dias para peças e mão de obra.";

// Imagem mínima em data URL; o renderizador de teste não a desenha.
pub const SIGNATURE_IMAGE: &str = "data:image/png;base64,iVBORw0KGgo=";

/// "PDF" de mentira com o hash embutido, para checar o que foi emitido.
pub struct StubRenderer;

impl ReceiptRenderer for StubRenderer {
    fn render(&self, data: &ReceiptData) -> Result<Vec<u8>, AppError> {
        Ok(format!("%PDF-stub {} {}", data.verification_hash, data.verify_url).into_bytes())
    }
}

pub struct FailingRenderer;

impl ReceiptRenderer for FailingRenderer {
    fn render(&self, _data: &ReceiptData) -> Result<Vec<u8>, AppError> {
        Err(AppError::IntegrityFailure("fonte ausente".into()))
    }
}

/// Blob storage que pode recusar gravações de comprovante sob demanda.
#[derive(Default)]
pub struct FlakyBlobStorage {
    pub inner: MemoryBlobStorage,
    pub fail_receipts: AtomicBool,
}

#[async_trait]
impl BlobStorage for FlakyBlobStorage {
    async fn put(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<String, AppError> {
        if key.contains("/receipts/") && self.fail_receipts.load(Ordering::SeqCst) {
            return Err(AppError::InternalServerError(anyhow::anyhow!("bucket indisponível")));
        }
        self.inner.put(key, bytes, content_type).await
    }

    async fn get(&self, key: &str) -> Result<Option<StoredBlob>, AppError> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        self.inner.delete(key).await
    }
}

/// Store em memória com uma camada que simula UPDATE manual no banco:
/// aprovações adulteradas aparecem em todas as leituras, sem passar pelas regras.
/// `refuse_close` simula outra resposta gravada no banco antes desta.
#[derive(Default)]
pub struct TamperableStore {
    inner: MemoryStore,
    tampered: Mutex<HashMap<Uuid, ServiceApproval>>,
    pub refuse_close: AtomicBool,
}

impl TamperableStore {
    pub fn tamper_approval(&self, approval: ServiceApproval) {
        self.tampered.lock().unwrap().insert(approval.id, approval);
    }

    fn overlay(&self, approval: Option<ServiceApproval>) -> Option<ServiceApproval> {
        approval.map(|found| self.tampered.lock().unwrap().get(&found.id).cloned().unwrap_or(found))
    }
}

#[async_trait]
impl Store for TamperableStore {
    async fn next_display_number(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        self.inner.next_display_number(tenant_id).await
    }

    async fn insert_order(&self, order: &ServiceOrder, audit: &AuditLogEntry) -> Result<(), AppError> {
        self.inner.insert_order(order, audit).await
    }

    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceOrder>, AppError> {
        self.inner.get_order(tenant_id, order_id).await
    }

    async fn save_order(
        &self,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        self.inner.save_order(order, expected_version, audit).await
    }

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        self.inner.append_audit(entry).await
    }

    async fn list_audit(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<AuditLogEntry>, AppError> {
        self.inner.list_audit(tenant_id, order_id).await
    }

    async fn open_approval(
        &self,
        approval: &ServiceApproval,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        self.inner.open_approval(approval, order, expected_version, audit).await
    }

    async fn get_approval(&self, tenant_id: Uuid, approval_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        Ok(self.overlay(self.inner.get_approval(tenant_id, approval_id).await?))
    }

    async fn find_approval_by_token(&self, token: &str) -> Result<Option<ServiceApproval>, AppError> {
        Ok(self.overlay(self.inner.find_approval_by_token(token).await?))
    }

    async fn find_approval_by_hash(&self, verification_hash: &str) -> Result<Option<ServiceApproval>, AppError> {
        Ok(self.overlay(self.inner.find_approval_by_hash(verification_hash).await?))
    }

    async fn latest_approval(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        Ok(self.overlay(self.inner.latest_approval(tenant_id, order_id).await?))
    }

    async fn close_approval(&self, closing: &ApprovalClosing<'_>) -> Result<(), AppError> {
        if self.refuse_close.load(Ordering::SeqCst) {
            return Err(AppError::AlreadyResponded);
        }
        self.inner.close_approval(closing).await
    }

    async fn set_receipt_url(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
        receipt_url: &str,
        audit: &AuditLogEntry,
    ) -> Result<(), AppError> {
        self.inner.set_receipt_url(tenant_id, approval_id, receipt_url, audit).await
    }

    async fn get_signature(&self, tenant_id: Uuid, signature_id: Uuid) -> Result<Option<DigitalSignature>, AppError> {
        self.inner.get_signature(tenant_id, signature_id).await
    }

    async fn insert_evidence(&self, evidence: &Evidence, audit: &AuditLogEntry) -> Result<(), AppError> {
        self.inner.insert_evidence(evidence, audit).await
    }

    async fn get_evidence(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<Option<Evidence>, AppError> {
        self.inner.get_evidence(tenant_id, evidence_id).await
    }

    async fn list_evidence(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<Evidence>, AppError> {
        self.inner.list_evidence(tenant_id, order_id).await
    }

    async fn retire_evidence(
        &self,
        tenant_id: Uuid,
        evidence_id: Uuid,
        retired_at: DateTime<Utc>,
        retired_by: &str,
        audit: &AuditLogEntry,
    ) -> Result<Evidence, AppError> {
        self.inner.retire_evidence(tenant_id, evidence_id, retired_at, retired_by, audit).await
    }

    async fn insert_payment(&self, payment: &ServicePayment, audit: &AuditLogEntry) -> Result<(), AppError> {
        self.inner.insert_payment(payment, audit).await
    }

    async fn list_payments(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<ServicePayment>, AppError> {
        self.inner.list_payments(tenant_id, order_id).await
    }

    async fn get_settings(&self, tenant_id: Uuid) -> Result<ShopSettings, AppError> {
        self.inner.get_settings(tenant_id).await
    }

    async fn put_settings(&self, settings: &ShopSettings) -> Result<(), AppError> {
        self.inner.put_settings(settings).await
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

pub struct Harness {
    pub desk: OrderDesk,
    pub store: Arc<TamperableStore>,
    pub blobs: Arc<FlakyBlobStorage>,
    pub clock: Arc<ManualClock>,
    pub notifier: Arc<RecordingNotifier>,
    pub tenant_id: Uuid,
    pub manager: Principal,
    pub technician: Principal,
}

pub struct HarnessBuilder {
    policy: PolicyMode,
    renderer: Arc<dyn ReceiptRenderer>,
}

impl HarnessBuilder {
    pub fn policy(mut self, policy: PolicyMode) -> Self {
        self.policy = policy;
        self
    }

    pub fn renderer(mut self, renderer: impl ReceiptRenderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub async fn build(self) -> Harness {
        let store = Arc::new(TamperableStore::default());
        let blobs = Arc::new(FlakyBlobStorage::default());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));
        let notifier = Arc::new(RecordingNotifier::default());

        let desk = OrderDesk::new(
            Collaborators {
                store: store.clone(),
                blobs: blobs.clone(),
                renderer: self.renderer,
                notifier: notifier.clone(),
                clock: clock.clone(),
            },
            DeskSettings {
                public_base_url: BASE_URL.to_string(),
                evidence_policy: EvidencePolicy::new(self.policy),
            },
        );

        let tenant_id = Uuid::new_v4();
        let manager = principal(tenant_id, "Carla Gerente", Role::Manager, &[]);
        let technician = principal(
            tenant_id,
            "Tiago Técnico",
            Role::Technician,
            &["orders:read", "orders:write", "evidence:write", "approvals:write", "payments:write"],
        );

        desk.update_settings(
            &manager,
            tenant_id,
            UpdateSettingsRequest {
                company_name: Some("Assistência Central".into()),
                document_number: Some("12.345.678/0001-99".into()),
                address: None,
                phone: None,
                warranty_terms: Some(WARRANTY.into()),
            },
        )
        .await
        .unwrap();

        Harness {
            desk,
            store,
            blobs,
            clock,
            notifier,
            tenant_id,
            manager,
            technician,
        }
    }
}

pub fn principal(tenant_id: Uuid, name: &str, role: Role, permissions: &[&str]) -> Principal {
    Principal {
        id: Uuid::new_v4(),
        name: name.into(),
        tenant_id,
        role,
        permissions: permissions.iter().map(|p| p.to_string()).collect(),
    }
}

pub fn dec(value: i64) -> Decimal {
    Decimal::new(value, 0)
}

pub fn item(name: &str, price: i64, severity: Severity) -> NewItemRequest {
    NewItemRequest {
        name: name.into(),
        price: dec(price),
        severity,
        kind: ItemKind::Part,
        approved: None,
    }
}

pub fn signature(name: &str) -> SignaturePayload {
    SignaturePayload {
        signer_name: name.into(),
        signer_document: Some("123.456.789-00".into()),
        signature_image: SIGNATURE_IMAGE.into(),
        terms_accepted: true,
    }
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder {
            policy: PolicyMode::Off,
            renderer: Arc::new(StubRenderer),
        }
    }

    pub async fn new() -> Self {
        Self::builder().build().await
    }

    pub async fn create_order(&self, items: Vec<NewItemRequest>) -> ServiceOrder {
        self.desk
            .create_order(
                &self.technician,
                self.tenant_id,
                CreateOrderRequest {
                    customer: CustomerPayload {
                        id: None,
                        name: "Maria Souza".into(),
                        phone: Some("+55 11 98888-7777".into()),
                        email: None,
                    },
                    device: "iPhone 12".into(),
                    items,
                    checklist: Vec::new(),
                },
            )
            .await
            .unwrap()
    }

    pub async fn advance(&self, order_id: Uuid, target: OrderStatus) -> ServiceOrder {
        self.desk
            .request_transition(
                &self.technician,
                self.tenant_id,
                order_id,
                TransitionRequest {
                    target_status: target,
                    reason: None,
                    confirm_underpaid: false,
                },
            )
            .await
            .unwrap()
            .order
    }

    /// OS em IN_ANALYSIS com tela (crítica, 100) e película (recomendada, 50).
    pub async fn analysed_order(&self) -> ServiceOrder {
        let order = self
            .create_order(vec![
                item("Troca de tela", 100, Severity::Critical),
                item("Película", 50, Severity::Recommended),
            ])
            .await;
        self.advance(order.id, OrderStatus::AwaitingAnalysis).await;
        self.advance(order.id, OrderStatus::InAnalysis).await
    }
}
