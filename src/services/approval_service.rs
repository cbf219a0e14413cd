// src/services/approval_service.rs

use std::sync::Arc;

use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{clock::Clock, error::AppError},
    db::{ApprovalClosing, BlobStorage, Store},
    models::{
        approval::{
            ApprovalChannel, ApprovalStatus, ApprovalView, ClientMetadata, DigitalSignature, ItemSelection,
            ServiceApproval, SignatureArtifact, SignaturePayload,
        },
        audit::{AuditAction, AuditLogEntry},
        auth::Actor,
        evidence::{Evidence, EvidenceStage},
        order::{approved_total, ServiceItem, ServiceOrder, Severity},
    },
    services::receipt_service::{decode_data_url, generate_verification_hash, ReceiptService},
};

/// Token de uso único do link: 256 bits aleatórios em hexadecimal.
pub fn generate_token() -> String {
    format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// O que prova a concordância do cliente.
#[derive(Debug, Clone)]
pub enum SignatureProof {
    Drawn {
        payload: SignaturePayload,
        client: ClientMetadata,
    },
    /// Termo em papel já guardado no storage, ainda não registrado como evidência.
    Document { evidence: Evidence, signer_name: String },
}

#[derive(Debug, Clone)]
pub enum Decision {
    Approve {
        selections: Vec<ItemSelection>,
        proof: SignatureProof,
    },
    Reject {
        reason: Option<String>,
    },
}

/// Resultado do fechamento, já persistido.
#[derive(Debug, Clone)]
pub struct ClosedApproval {
    pub approval: ServiceApproval,
    pub signature: Option<DigitalSignature>,
    pub evidence: Option<Evidence>,
}

impl ClosedApproval {
    pub fn is_partial(&self) -> bool {
        self.approval.status == ApprovalStatus::Approved
            && self.approval.items_snapshot.iter().any(|item| !item.approved)
    }
}

/// Aplica as escolhas do cliente no snapshot. Item crítico recusado é erro, não coerção.
pub fn apply_selections(snapshot: &mut [ServiceItem], selections: &[ItemSelection]) -> Result<(), AppError> {
    for selection in selections {
        let item = snapshot
            .iter_mut()
            .find(|item| item.id == selection.item_id)
            .ok_or_else(|| AppError::invalid("selections", format!("item {} não está nesta aprovação", selection.item_id)))?;

        if item.severity == Severity::Critical && !selection.approved {
            return Err(AppError::invalid(
                "selections",
                format!("item crítico '{}' não pode ser recusado", item.name),
            ));
        }
        item.approved = selection.approved;
    }
    Ok(())
}

/// Assinatura desenhada: nome, imagem decodificável e termos aceitos.
pub fn check_signature(payload: &SignaturePayload) -> Result<(), AppError> {
    payload.validate()?;
    if !payload.terms_accepted {
        return Err(AppError::invalid("termsAccepted", "os termos precisam ser aceitos"));
    }
    decode_data_url(&payload.signature_image)?;
    Ok(())
}

#[derive(Clone)]
pub struct ApprovalService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStorage>,
    receipts: ReceiptService,
    clock: Arc<dyn Clock>,
    public_base_url: String,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStorage>,
        receipts: ReceiptService,
        clock: Arc<dyn Clock>,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            blobs,
            receipts,
            clock,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn link_for(&self, token: &str) -> String {
        format!("{}/aprovacao/{}", self.public_base_url, token)
    }

    /// Monta a aprovação PENDING com cópia profunda dos itens escolhidos (todos, se vazio).
    pub fn build_request(
        &self,
        order: &ServiceOrder,
        item_ids: &[Uuid],
        description: &str,
        channel: Option<ApprovalChannel>,
        actor: &Actor,
    ) -> Result<ServiceApproval, AppError> {
        let description = description.trim();
        if description.is_empty() {
            return Err(AppError::invalid("description", "descrição técnica obrigatória"));
        }

        let snapshot: Vec<ServiceItem> = if item_ids.is_empty() {
            order.items().to_vec()
        } else {
            item_ids
                .iter()
                .map(|id| {
                    order
                        .item(*id)
                        .cloned()
                        .ok_or_else(|| AppError::invalid("itemIds", format!("item {id} não pertence à OS")))
                })
                .collect::<Result<_, _>>()?
        };

        if snapshot.is_empty() {
            return Err(AppError::invalid("itemIds", "a aprovação precisa de ao menos um item"));
        }

        Ok(ServiceApproval {
            id: Uuid::new_v4(),
            order_id: order.id,
            tenant_id: order.tenant_id,
            token: generate_token(),
            description: description.to_string(),
            total_value: approved_total(&snapshot)?,
            items_snapshot: snapshot,
            status: ApprovalStatus::Pending,
            channel,
            requested_by: actor.name.clone(),
            created_at: self.clock.now(),
            responded_at: None,
            rejection_reason: None,
            digital_signature_id: None,
            receipt_url: None,
            verification_hash: None,
            warranty_terms: None,
        })
    }

    pub async fn find_by_token(&self, token: &str) -> Result<ServiceApproval, AppError> {
        if token.trim().is_empty() {
            return Err(AppError::not_found("Aprovação"));
        }
        self.store
            .find_approval_by_token(token.trim())
            .await?
            .ok_or_else(|| AppError::not_found("Aprovação"))
    }

    pub async fn get(&self, tenant_id: Uuid, approval_id: Uuid) -> Result<ServiceApproval, AppError> {
        self.store
            .get_approval(tenant_id, approval_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Aprovação {approval_id}")))
    }

    /// Visão pública do link: só o que o cliente precisa para decidir.
    pub async fn view(&self, approval: &ServiceApproval) -> Result<ApprovalView, AppError> {
        let order = self
            .store
            .get_order(approval.tenant_id, approval.order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("OS {}", approval.order_id)))?;
        let shop = self.store.get_settings(approval.tenant_id).await?;

        // Antes da resposta mostramos a garantia vigente; depois, a que foi aceita
        let warranty_terms = if approval.is_pending() {
            shop.warranty_terms.clone()
        } else {
            approval.warranty_terms.clone()
        };

        Ok(ApprovalView {
            approval_id: approval.id,
            order_number: order.display_number,
            shop_name: shop.company_name,
            customer_name: order.customer.name,
            device: order.device,
            description: approval.description.clone(),
            items: approval.items_snapshot.clone(),
            total_value: approval.total_value,
            status: approval.status,
            responded_at: approval.responded_at,
            warranty_terms,
            receipt_url: approval.receipt_url.clone(),
            verification_hash: approval.verification_hash.clone(),
        })
    }

    /// Ponto único de fechamento para os três canais. Só fecha aprovações PENDING; o
    /// status da OS fica com quem chama.
    pub async fn process_decision(
        &self,
        approval: ServiceApproval,
        order: &ServiceOrder,
        channel: ApprovalChannel,
        decision: Decision,
        actor: &Actor,
    ) -> Result<ClosedApproval, AppError> {
        if !approval.is_pending() {
            return Err(AppError::AlreadyResponded);
        }

        match decision {
            Decision::Approve { selections, proof } => self.approve(approval, order, channel, selections, proof, actor).await,
            Decision::Reject { reason } => self.reject(approval, channel, reason, actor).await,
        }
    }

    /// Se a aprovação não chegar a fechar, o documento físico já gravado é removido.
    async fn approve(
        &self,
        approval: ServiceApproval,
        order: &ServiceOrder,
        channel: ApprovalChannel,
        selections: Vec<ItemSelection>,
        proof: SignatureProof,
        actor: &Actor,
    ) -> Result<ClosedApproval, AppError> {
        let document_key = match &proof {
            SignatureProof::Document { evidence, .. } => Some(evidence.storage_key.clone()),
            SignatureProof::Drawn { .. } => None,
        };

        let result = self.close_approved(approval, order, channel, selections, proof, actor).await;

        if result.is_err()
            && let Some(key) = document_key
            && let Err(e) = self.blobs.delete(&key).await
        {
            tracing::warn!("⚠️ Documento {} ficou sem registro e não foi removido: {}", key, e);
        }
        result
    }

    async fn close_approved(
        &self,
        mut approval: ServiceApproval,
        order: &ServiceOrder,
        channel: ApprovalChannel,
        selections: Vec<ItemSelection>,
        proof: SignatureProof,
        actor: &Actor,
    ) -> Result<ClosedApproval, AppError> {
        // 1. Escolhas do cliente (só no snapshot, a OS é ajustada depois por quem chama)
        apply_selections(&mut approval.items_snapshot, &selections)?;
        approval.total_value = approved_total(&approval.items_snapshot)?;

        // 2. Prova de concordância
        let now = self.clock.now();
        let signature_id = Uuid::new_v4();
        let (artifact, signer_name, signer_document, client, evidence) = match proof {
            SignatureProof::Drawn { payload, client } => {
                check_signature(&payload)?;
                (
                    SignatureArtifact::Drawn {
                        image_data_url: payload.signature_image,
                    },
                    payload.signer_name.trim().to_string(),
                    payload.signer_document,
                    client,
                    None,
                )
            }
            SignatureProof::Document { evidence, signer_name } => {
                if evidence.stage != EvidenceStage::AprovacaoDocumental || evidence.order_id != order.id {
                    return Err(AppError::invalid("document", "documento não corresponde a esta aprovação"));
                }
                (
                    SignatureArtifact::PhysicalDocument {
                        evidence_id: evidence.id,
                        document_url: evidence.url.clone(),
                        file_hash: evidence.file_hash.clone(),
                    },
                    signer_name,
                    None,
                    ClientMetadata::default(),
                    Some(evidence),
                )
            }
        };

        let signature = DigitalSignature {
            id: signature_id,
            approval_id: approval.id,
            tenant_id: approval.tenant_id,
            artifact,
            signer_name,
            signer_document,
            terms_accepted: true,
            client_ip: client.ip,
            user_agent: client.user_agent,
            signed_at: now,
        };

        // 3. Registro fechado + hash, antes de qualquer renderização
        let shop = self.store.get_settings(approval.tenant_id).await?;
        approval.status = ApprovalStatus::Approved;
        approval.channel = Some(channel);
        approval.responded_at = Some(now);
        approval.digital_signature_id = Some(signature.id);
        approval.warranty_terms = shop.warranty_terms.clone();
        approval.verification_hash = Some(generate_verification_hash(&approval, &signature)?);

        // 4. Comprovante renderizado em memória: falha aqui aborta antes de qualquer escrita
        let data = self.receipts.build(&approval, order, &shop, &signature)?;
        let pdf = self.receipts.render(&data)?;

        // 5. Persistência atômica e condicional (PENDING)
        let mut audit = Vec::new();
        if let Some(evidence) = &evidence {
            audit.push(AuditLogEntry::new(
                approval.tenant_id,
                Some(order.id),
                actor,
                AuditAction::EvidenceUploaded,
                format!("Documento de aprovação anexado ({})", evidence.file_hash),
                now,
            ));
        }
        audit.push(
            AuditLogEntry::new(
                approval.tenant_id,
                Some(order.id),
                actor,
                AuditAction::ApprovalApproved,
                format!(
                    "Aprovação {} aceita via {:?} por {} (total {})",
                    approval.id, channel, signature.signer_name, approval.total_value
                ),
                now,
            )
            .with_changes(
                serde_json::json!({ "status": ApprovalStatus::Pending }),
                serde_json::json!({
                    "status": ApprovalStatus::Approved,
                    "total": approval.total_value,
                    "verificationHash": approval.verification_hash,
                }),
            ),
        );
        self.store
            .close_approval(&ApprovalClosing {
                approval: &approval,
                signature: Some(&signature),
                evidence: evidence.as_ref(),
                audit: &audit,
            })
            .await?;

        // 6. Só agora o PDF vai para o storage; falha deixa a aprovação sem URL para regenerar
        match self.receipts.store_receipt(&approval, &pdf).await {
            Ok(url) => {
                let issued = AuditLogEntry::new(
                    approval.tenant_id,
                    Some(order.id),
                    actor,
                    AuditAction::ReceiptGenerated,
                    format!("Comprovante emitido: {url}"),
                    now,
                );
                match self.store.set_receipt_url(approval.tenant_id, approval.id, &url, &issued).await {
                    Ok(()) => approval.receipt_url = Some(url),
                    Err(e) => tracing::warn!("⚠️ URL do comprovante {} não foi gravada: {}", approval.id, e),
                }
            }
            Err(e) => {
                tracing::warn!("⚠️ Comprovante da aprovação {} não foi armazenado: {}", approval.id, e);
            }
        }

        tracing::info!(
            "✅ Aprovação {} da OS #{} aceita via {:?}",
            approval.id,
            order.display_number,
            channel
        );

        Ok(ClosedApproval {
            approval,
            signature: Some(signature),
            evidence,
        })
    }

    async fn reject(
        &self,
        mut approval: ServiceApproval,
        channel: ApprovalChannel,
        reason: Option<String>,
        actor: &Actor,
    ) -> Result<ClosedApproval, AppError> {
        let now = self.clock.now();

        approval.status = ApprovalStatus::Rejected;
        approval.channel = Some(channel);
        approval.responded_at = Some(now);
        approval.rejection_reason = reason.map(|r| r.trim().to_string()).filter(|r| !r.is_empty());

        let audit = AuditLogEntry::new(
            approval.tenant_id,
            Some(approval.order_id),
            actor,
            AuditAction::ApprovalRejected,
            format!(
                "Aprovação {} recusada: {}",
                approval.id,
                approval.rejection_reason.as_deref().unwrap_or("sem motivo informado")
            ),
            now,
        );

        self.store
            .close_approval(&ApprovalClosing {
                approval: &approval,
                signature: None,
                evidence: None,
                audit: std::slice::from_ref(&audit),
            })
            .await?;

        tracing::info!("❌ Aprovação {} recusada", approval.id);

        Ok(ClosedApproval {
            approval,
            signature: None,
            evidence: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::ItemKind;
    use rust_decimal::Decimal;

    fn item(severity: Severity) -> ServiceItem {
        ServiceItem {
            id: Uuid::new_v4(),
            name: "Bateria".into(),
            price: Decimal::new(5000, 2),
            approved: true,
            severity,
            kind: ItemKind::Part,
        }
    }

    #[test]
    fn tokens_are_long_and_unique() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }

    #[test]
    fn customer_cannot_decline_critical_item() {
        let mut snapshot = vec![item(Severity::Critical), item(Severity::Recommended)];
        let critical = snapshot[0].id;

        let err = apply_selections(
            &mut snapshot,
            &[ItemSelection {
                item_id: critical,
                approved: false,
            }],
        )
        .unwrap_err();

        assert!(matches!(err, AppError::InvalidField { .. }));
        assert!(snapshot[0].approved);
    }

    #[test]
    fn recommended_items_toggle_freely() {
        let mut snapshot = vec![item(Severity::Critical), item(Severity::Recommended)];
        let recommended = snapshot[1].id;

        apply_selections(
            &mut snapshot,
            &[ItemSelection {
                item_id: recommended,
                approved: false,
            }],
        )
        .unwrap();

        assert!(!snapshot[1].approved);
        assert_eq!(approved_total(&snapshot).unwrap(), Decimal::new(5000, 2));
    }

    #[test]
    fn unknown_selection_is_rejected() {
        let mut snapshot = vec![item(Severity::Recommended)];
        assert!(apply_selections(
            &mut snapshot,
            &[ItemSelection {
                item_id: Uuid::new_v4(),
                approved: true,
            }],
        )
        .is_err());
    }
}
