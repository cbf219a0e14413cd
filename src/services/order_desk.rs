// src/services/order_desk.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{clock::Clock, error::AppError, locks::OrderLocks},
    db::{BlobStorage, Store},
    models::{
        approval::{
            ApprovalChannel, ApprovalDecision, ApprovalResult, ApprovalStatus, ApprovalToken, ApprovalView,
            ClientMetadata, CreateApprovalRequest, InPersonApprovalRequest, InPersonRejectionRequest, ItemSelection,
            ServiceApproval, SubmitDecisionRequest, VerificationReport,
        },
        audit::{AuditAction, AuditLogEntry},
        auth::{Actor, Principal, PERM_EVIDENCE_RETIRE},
        evidence::{Evidence, EvidenceCheck, EvidenceStage, UploadedFile},
        order::{
            ChecklistEntry, CreateOrderRequest, NewItemRequest, OrderDetail, OrderStatus, ServiceOrder,
            TransitionOutcome, TransitionRequest, UpdateItemRequest,
        },
        payment::{PaymentOutcome, PaymentSummary, RecordPaymentRequest, ServicePayment},
        settings::{ShopSettings, UpdateSettingsRequest},
    },
    services::{
        approval_service::{check_signature, ApprovalService, ClosedApproval, Decision, SignatureProof},
        evidence_policy::EvidencePolicy,
        evidence_service::EvidenceService,
        notification::{Notification, Notifier},
        payment_service::PaymentService,
        receipt_service::{ReceiptRenderer, ReceiptService},
        state_machine::{ensure_transition, OrderStateMachine},
    },
};

const DEFAULT_REJECTION_REASON: &str = "Recusado pelo cliente";

/// Colaboradores externos do núcleo.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn Store>,
    pub blobs: Arc<dyn BlobStorage>,
    pub renderer: Arc<dyn ReceiptRenderer>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct DeskSettings {
    pub public_base_url: String,
    pub evidence_policy: EvidencePolicy,
}

/// Balcão da OS: serializa as escritas por OS e coordena fluxo de aprovação,
/// pagamentos e máquina de estados.
#[derive(Clone)]
pub struct OrderDesk {
    store: Arc<dyn Store>,
    locks: Arc<OrderLocks>,
    orders: OrderStateMachine,
    approvals: ApprovalService,
    receipts: ReceiptService,
    evidence: EvidenceService,
    payments: PaymentService,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

fn ensure_tenant(principal: &Principal, tenant_id: Uuid) -> Result<(), AppError> {
    if principal.can_access_tenant(tenant_id) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!("sem acesso à loja {tenant_id}")))
    }
}

impl OrderDesk {
    pub fn new(collaborators: Collaborators, settings: DeskSettings) -> Self {
        let Collaborators {
            store,
            blobs,
            renderer,
            notifier,
            clock,
        } = collaborators;

        let receipts = ReceiptService::new(
            store.clone(),
            blobs.clone(),
            renderer,
            clock.clone(),
            &settings.public_base_url,
        );

        Self {
            locks: Arc::new(OrderLocks::new()),
            orders: OrderStateMachine::new(store.clone(), clock.clone(), settings.evidence_policy),
            approvals: ApprovalService::new(
                store.clone(),
                blobs.clone(),
                receipts.clone(),
                clock.clone(),
                &settings.public_base_url,
            ),
            evidence: EvidenceService::new(store.clone(), blobs, clock.clone()),
            payments: PaymentService::new(store.clone(), clock.clone()),
            receipts,
            store,
            notifier,
            clock,
        }
    }

    async fn notify(&self, notification: Notification) {
        if let Err(e) = self.notifier.notify(&notification).await {
            tracing::warn!("⚠️ Falha ao notificar {}: {}", notification.recipient, e);
        }
    }

    async fn load(&self, principal: &Principal, tenant_id: Uuid, order_id: Uuid) -> Result<ServiceOrder, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.orders.load(tenant_id, order_id).await
    }

    // =========================================================================
    //  ORDENS
    // =========================================================================

    pub async fn create_order(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        request: CreateOrderRequest,
    ) -> Result<ServiceOrder, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.orders.create_order(tenant_id, request, &principal.actor()).await
    }

    pub async fn get_order(&self, principal: &Principal, tenant_id: Uuid, order_id: Uuid) -> Result<ServiceOrder, AppError> {
        self.load(principal, tenant_id, order_id).await
    }

    pub async fn order_detail(&self, principal: &Principal, tenant_id: Uuid, order_id: Uuid) -> Result<OrderDetail, AppError> {
        let order = self.load(principal, tenant_id, order_id).await?;

        let audit_log = self.store.list_audit(tenant_id, order_id).await?;
        let evidence = self.evidence.grouped(tenant_id, order_id).await?;
        let payments = self.payments.summary(&order).await?;
        let active_approval = self.store.latest_approval(tenant_id, order_id).await?;

        Ok(OrderDetail {
            order,
            audit_log,
            evidence,
            payments,
            active_approval,
        })
    }

    /// Mais recente primeiro.
    pub async fn list_audit(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<AuditLogEntry>, AppError> {
        self.load(principal, tenant_id, order_id).await?;
        self.store.list_audit(tenant_id, order_id).await
    }

    /// Transição pedida pela equipe. APPROVED/REJECTED/AWAITING_APPROVAL só pelos
    /// fluxos de aprovação; PICKED_UP com saldo em aberto exige confirmação.
    pub async fn request_transition(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: TransitionRequest,
    ) -> Result<TransitionOutcome, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        let actor = principal.actor();
        let target = request.target_status;

        ensure_transition(order.status, target)?;

        let mut extra_audit = Vec::new();
        let mut reason = request.reason.clone();

        match target {
            OrderStatus::AwaitingApproval => {
                return Err(AppError::invalid(
                    "targetStatus",
                    "use a solicitação de aprovação para enviar o orçamento ao cliente",
                ));
            }
            OrderStatus::Approved | OrderStatus::Rejected => {
                // Só acompanha uma resposta já registrada (ex.: OS não avançou depois do fechamento)
                let expected = if target == OrderStatus::Approved {
                    ApprovalStatus::Approved
                } else {
                    ApprovalStatus::Rejected
                };
                let latest = self
                    .store
                    .latest_approval(tenant_id, order_id)
                    .await?
                    .filter(|approval| approval.status == expected)
                    .ok_or_else(|| {
                        AppError::invalid("targetStatus", format!("{target} depende da resposta do cliente"))
                    })?;

                if target == OrderStatus::Approved {
                    extra_audit.extend(self.orders.apply_customer_selection(
                        &mut order,
                        &latest.items_snapshot,
                        &actor,
                    )?);
                } else if reason.as_deref().map(str::trim).unwrap_or_default().is_empty() {
                    reason = Some(
                        latest
                            .rejection_reason
                            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string()),
                    );
                }
            }
            OrderStatus::PickedUp
                if matches!(
                    order.status,
                    OrderStatus::Done | OrderStatus::AwaitingPayment | OrderStatus::Paid
                ) =>
            {
                let summary = self.payments.summary(&order).await?;
                if summary.balance > Decimal::ZERO {
                    if !request.confirm_underpaid {
                        return Err(AppError::UnderpaidWithdrawal {
                            balance: summary.balance,
                        });
                    }

                    tracing::warn!(
                        "⚠️ OS #{} entregue com saldo de R$ {:.2} (confirmado por {})",
                        order.display_number,
                        summary.balance,
                        actor.name
                    );
                    extra_audit.push(AuditLogEntry::new(
                        tenant_id,
                        Some(order_id),
                        &actor,
                        AuditAction::UnderpaidWithdrawalConfirmed,
                        format!("Retirada confirmada com saldo em aberto de R$ {:.2}", summary.balance),
                        self.clock.now(),
                    ));
                }
            }
            _ => {}
        }

        let warnings = self
            .orders
            .transition(&mut order, target, reason.as_deref(), &actor, extra_audit)
            .await?;

        Ok(TransitionOutcome { order, warnings })
    }

    pub async fn add_item(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: NewItemRequest,
    ) -> Result<ServiceOrder, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        self.orders.add_item(&mut order, request, &principal.actor()).await?;
        Ok(order)
    }

    pub async fn update_item(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
        request: UpdateItemRequest,
    ) -> Result<ServiceOrder, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        self.orders
            .update_item(&mut order, item_id, request, &principal.actor())
            .await?;
        Ok(order)
    }

    pub async fn remove_item(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        item_id: Uuid,
    ) -> Result<ServiceOrder, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        self.orders.remove_item(&mut order, item_id, &principal.actor()).await?;
        Ok(order)
    }

    pub async fn set_checklist(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        checklist: Vec<ChecklistEntry>,
    ) -> Result<ServiceOrder, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        self.orders.set_checklist(&mut order, checklist, &principal.actor()).await?;
        Ok(order)
    }

    pub async fn set_technical_notes(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        notes: Option<String>,
    ) -> Result<ServiceOrder, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        self.orders
            .set_technical_notes(&mut order, notes, &principal.actor())
            .await?;
        Ok(order)
    }

    // =========================================================================
    //  APROVAÇÕES
    // =========================================================================

    /// Abre a aprovação PENDING e leva a OS para AWAITING_APPROVAL numa única escrita.
    async fn open_approval(
        &self,
        order: &mut ServiceOrder,
        item_ids: &[Uuid],
        description: &str,
        channel: ApprovalChannel,
        actor: &Actor,
    ) -> Result<ServiceApproval, AppError> {
        ensure_transition(order.status, OrderStatus::AwaitingApproval)?;
        self.orders
            .evidence_warnings(order, OrderStatus::AwaitingApproval)
            .await?;

        let approval = self
            .approvals
            .build_request(order, item_ids, description, Some(channel), actor)?;

        let mut staged = order.clone();
        let transition_audit = self
            .orders
            .apply_transition(&mut staged, OrderStatus::AwaitingApproval, None, actor)?;
        let request_audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::ApprovalRequested,
            format!(
                "Aprovação {} solicitada ({} itens, total R$ {:.2})",
                approval.id,
                approval.items_snapshot.len(),
                approval.total_value
            ),
            approval.created_at,
        );

        let expected_version = staged.version;
        staged.version += 1;
        self.store
            .open_approval(&approval, &staged, expected_version, &[transition_audit, request_audit])
            .await?;

        *order = staged;
        tracing::info!("📝 Aprovação {} aberta para a OS #{}", approval.id, order.display_number);
        Ok(approval)
    }

    async fn pending_or_open(
        &self,
        order: &mut ServiceOrder,
        channel: ApprovalChannel,
        description: &str,
        actor: &Actor,
    ) -> Result<ServiceApproval, AppError> {
        if let Some(latest) = self.store.latest_approval(order.tenant_id, order.id).await?
            && latest.is_pending()
        {
            return Ok(latest);
        }
        self.open_approval(order, &[], description, channel, actor).await
    }

    /// Fecha a aprovação e leva a OS para APPROVED/REJECTED.
    async fn close_and_advance(
        &self,
        approval: ServiceApproval,
        mut order: ServiceOrder,
        channel: ApprovalChannel,
        decision: Decision,
        actor: &Actor,
    ) -> Result<ApprovalResult, AppError> {
        let target = match decision {
            Decision::Approve { .. } => OrderStatus::Approved,
            Decision::Reject { .. } => OrderStatus::Rejected,
        };
        // A OS precisa aceitar o destino antes de a aprovação ser fechada
        ensure_transition(order.status, target)?;
        self.orders.evidence_warnings(&order, target).await?;

        let closed: ClosedApproval = self
            .approvals
            .process_decision(approval, &order, channel, decision, actor)
            .await?;

        let mut extra_audit = Vec::new();
        if target == OrderStatus::Approved {
            extra_audit.extend(
                self.orders
                    .apply_customer_selection(&mut order, &closed.approval.items_snapshot, actor)?,
            );
        }
        let reason = (target == OrderStatus::Rejected).then(|| {
            closed
                .approval
                .rejection_reason
                .clone()
                .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string())
        });

        if let Err(e) = self
            .orders
            .transition(&mut order, target, reason.as_deref(), actor, extra_audit)
            .await
        {
            // A resposta do cliente já está gravada; a equipe conclui via request_transition
            tracing::error!(
                "🚨 Aprovação {} fechada mas a OS {} não avançou para {}: {}",
                closed.approval.id,
                order.id,
                target,
                e
            );
            return Err(e);
        }

        if closed.approval.status == ApprovalStatus::Approved
            && let Some(hash) = &closed.approval.verification_hash
        {
            let message = format!(
                "Aprovação da OS #{} registrada. Comprovante: {}",
                order.display_number,
                self.receipts.verify_url(hash)
            );
            self.notify(Notification::to_customer(&order.customer, message)).await;
        }

        Ok(ApprovalResult {
            partial: closed.is_partial(),
            approval: closed.approval,
            signature: closed.signature,
            order_status: order.status,
        })
    }

    pub async fn create_approval_request(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: CreateApprovalRequest,
    ) -> Result<ApprovalToken, AppError> {
        request.validate()?;

        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;

        let approval = self
            .open_approval(
                &mut order,
                &request.item_ids,
                &request.description,
                ApprovalChannel::RemoteLink,
                &principal.actor(),
            )
            .await?;

        let link = self.approvals.link_for(&approval.token);
        self.notify(Notification::to_customer(
            &order.customer,
            format!(
                "Olá {}, o orçamento da OS #{} ({}) está pronto: {}",
                order.customer.name, order.display_number, order.device, link
            ),
        ))
        .await;

        Ok(ApprovalToken {
            approval_id: approval.id,
            token: approval.token,
            link,
        })
    }

    pub async fn get_approval_by_token(&self, token: &str) -> Result<ApprovalView, AppError> {
        let approval = self.approvals.find_by_token(token).await?;
        self.approvals.view(&approval).await
    }

    pub async fn get_approval(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        approval_id: Uuid,
    ) -> Result<ServiceApproval, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.approvals.get(tenant_id, approval_id).await
    }

    /// Resposta do cliente pelo link. Só a primeira submissão vence.
    pub async fn submit_approval_decision(
        &self,
        token: &str,
        request: SubmitDecisionRequest,
        client: ClientMetadata,
    ) -> Result<ApprovalResult, AppError> {
        request.validate()?;

        let found = self.approvals.find_by_token(token).await?;
        let _guard = self.locks.acquire(found.order_id).await;

        // Relido sob o lock: a segunda submissão enxerga a aprovação já fechada
        let approval = self.approvals.get(found.tenant_id, found.id).await?;
        if !approval.is_pending() {
            return Err(AppError::AlreadyResponded);
        }
        let order = self.orders.load(approval.tenant_id, approval.order_id).await?;

        let (decision, actor) = match request.decision {
            ApprovalDecision::Approve | ApprovalDecision::PartialApprove => {
                let payload = request
                    .signature
                    .ok_or_else(|| AppError::invalid("signature", "assinatura obrigatória para aprovar"))?;
                let actor = Actor::customer(payload.signer_name.trim());
                (
                    Decision::Approve {
                        selections: request.selections,
                        proof: SignatureProof::Drawn { payload, client },
                    },
                    actor,
                )
            }
            ApprovalDecision::Reject => (
                Decision::Reject { reason: request.reason },
                Actor::customer(&order.customer.name),
            ),
        };

        self.close_and_advance(approval, order, ApprovalChannel::RemoteLink, decision, &actor)
            .await
    }

    /// Cliente presente no balcão assina na hora.
    pub async fn register_in_person_approval(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: InPersonApprovalRequest,
        client: ClientMetadata,
    ) -> Result<ApprovalResult, AppError> {
        request.validate()?;
        check_signature(&request.signature)?;

        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        let actor = principal.actor();

        let approval = self
            .pending_or_open(&mut order, ApprovalChannel::InPerson, "Aprovação presencial", &actor)
            .await?;

        let decision = Decision::Approve {
            selections: request.selections,
            proof: SignatureProof::Drawn {
                payload: request.signature,
                client,
            },
        };
        self.close_and_advance(approval, order, ApprovalChannel::InPerson, decision, &actor)
            .await
    }

    /// Cliente presente recusa o orçamento.
    pub async fn register_in_person_rejection(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: InPersonRejectionRequest,
    ) -> Result<ApprovalResult, AppError> {
        request.validate()?;

        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        let actor = principal.actor();

        let approval = self
            .pending_or_open(&mut order, ApprovalChannel::InPerson, "Recusa presencial", &actor)
            .await?;

        self.close_and_advance(
            approval,
            order,
            ApprovalChannel::InPerson,
            Decision::Reject { reason: request.reason },
            &actor,
        )
        .await
    }

    /// Termo em papel assinado: vira evidência APROVACAO_DOCUMENTAL e assinatura ao mesmo tempo.
    pub async fn register_physical_approval(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        selections: Vec<ItemSelection>,
        document: UploadedFile,
        signer_name: Option<String>,
    ) -> Result<ApprovalResult, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        let actor = principal.actor();

        // Status conferido antes de gravar o arquivo
        let has_pending = self
            .store
            .latest_approval(tenant_id, order_id)
            .await?
            .is_some_and(|approval| approval.is_pending());
        if !has_pending {
            ensure_transition(order.status, OrderStatus::AwaitingApproval)?;
        }

        let evidence = self
            .evidence
            .prepare(
                &order,
                document,
                EvidenceStage::AprovacaoDocumental,
                "Termo de autorização assinado",
                &actor.name,
            )
            .await?;

        let approval = self
            .pending_or_open(
                &mut order,
                ApprovalChannel::PhysicalDocument,
                "Aprovação por documento físico",
                &actor,
            )
            .await?;

        let signer_name = signer_name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| order.customer.name.clone());

        let decision = Decision::Approve {
            selections,
            proof: SignatureProof::Document { evidence, signer_name },
        };
        self.close_and_advance(approval, order, ApprovalChannel::PhysicalDocument, decision, &actor)
            .await
    }

    pub async fn regenerate_receipt(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        approval_id: Uuid,
    ) -> Result<ServiceApproval, AppError> {
        let approval = self.get_approval(principal, tenant_id, approval_id).await?;
        let _guard = self.locks.acquire(approval.order_id).await;

        self.receipts
            .regenerate(tenant_id, approval_id, &principal.actor())
            .await
    }

    pub async fn verify(&self, verification_hash: &str) -> Result<VerificationReport, AppError> {
        self.receipts.verify(verification_hash.trim()).await
    }

    // =========================================================================
    //  EVIDÊNCIAS
    // =========================================================================

    pub async fn upload_evidence(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        file: UploadedFile,
        stage: EvidenceStage,
        description: &str,
    ) -> Result<Evidence, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let order = self.load(principal, tenant_id, order_id).await?;
        self.evidence
            .upload(&order, file, stage, description, &principal.actor())
            .await
    }

    /// Privilegiado. A tentativa sem permissão também fica na auditoria.
    pub async fn retire_evidence(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        evidence_id: Uuid,
    ) -> Result<Evidence, AppError> {
        ensure_tenant(principal, tenant_id)?;
        let evidence = self.evidence.get(tenant_id, evidence_id).await?;

        let _guard = self.locks.acquire(evidence.order_id).await;
        let order = self.orders.load(tenant_id, evidence.order_id).await?;
        let actor = principal.actor();

        if !principal.has_permission(PERM_EVIDENCE_RETIRE) {
            tracing::warn!("🚫 {} tentou retirar a evidência {} sem permissão", actor.name, evidence_id);
            let denied = AuditLogEntry::new(
                tenant_id,
                Some(order.id),
                &actor,
                AuditAction::EvidenceRetireDenied,
                format!("Tentativa de retirar a evidência {evidence_id} sem permissão"),
                self.clock.now(),
            );
            self.store.append_audit(&denied).await?;
            return Err(AppError::Forbidden(format!(
                "é necessária a permissão '{PERM_EVIDENCE_RETIRE}'"
            )));
        }

        self.evidence.retire(&order, evidence_id, &actor).await
    }

    /// Por id, inclusive retiradas.
    pub async fn get_evidence(&self, principal: &Principal, tenant_id: Uuid, evidence_id: Uuid) -> Result<Evidence, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.evidence.get(tenant_id, evidence_id).await
    }

    pub async fn verify_evidence(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        evidence_id: Uuid,
    ) -> Result<EvidenceCheck, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.evidence.verify_digest(tenant_id, evidence_id).await
    }

    // =========================================================================
    //  PAGAMENTOS
    // =========================================================================

    /// Quitou uma OS em AWAITING_PAYMENT: ela segue para PAID na mesma chamada.
    pub async fn record_payment(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
        request: RecordPaymentRequest,
    ) -> Result<PaymentOutcome, AppError> {
        let _guard = self.locks.acquire(order_id).await;
        let mut order = self.load(principal, tenant_id, order_id).await?;
        let actor = principal.actor();

        let (payment, summary) = self.payments.record(&order, request, &actor).await?;

        if order.status == OrderStatus::AwaitingPayment && summary.ready_for_withdrawal {
            self.orders
                .transition(
                    &mut order,
                    OrderStatus::Paid,
                    Some("Pagamento integral registrado"),
                    &actor,
                    Vec::new(),
                )
                .await?;
        }

        Ok(PaymentOutcome {
            payment,
            summary,
            order_status: order.status,
        })
    }

    pub async fn payment_summary(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<PaymentSummary, AppError> {
        let order = self.load(principal, tenant_id, order_id).await?;
        self.payments.summary(&order).await
    }

    pub async fn list_payments(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        order_id: Uuid,
    ) -> Result<Vec<ServicePayment>, AppError> {
        let order = self.load(principal, tenant_id, order_id).await?;
        self.payments.list(&order).await
    }

    // =========================================================================
    //  CONFIGURAÇÕES DA LOJA
    // =========================================================================

    pub async fn get_settings(&self, principal: &Principal, tenant_id: Uuid) -> Result<ShopSettings, AppError> {
        ensure_tenant(principal, tenant_id)?;
        self.store.get_settings(tenant_id).await
    }

    pub async fn update_settings(
        &self,
        principal: &Principal,
        tenant_id: Uuid,
        request: UpdateSettingsRequest,
    ) -> Result<ShopSettings, AppError> {
        ensure_tenant(principal, tenant_id)?;
        if !principal.role.is_privileged() {
            return Err(AppError::Forbidden("apenas gestores alteram os dados da loja".into()));
        }

        let settings = ShopSettings {
            tenant_id,
            company_name: request.company_name,
            document_number: request.document_number,
            address: request.address,
            phone: request.phone,
            warranty_terms: request.warranty_terms,
            updated_at: Some(self.clock.now()),
        };
        self.store.put_settings(&settings).await?;
        Ok(settings)
    }
}

