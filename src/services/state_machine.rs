// src/services/state_machine.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{clock::Clock, error::AppError, money::check_money},
    db::Store,
    models::{
        audit::{AuditAction, AuditLogEntry},
        auth::Actor,
        evidence::EvidenceStage,
        order::{
            ChecklistEntry, CreateOrderRequest, NewItemRequest, OrderStatus, ServiceItem, ServiceOrder,
            Severity, StatusHistoryEntry, UpdateItemRequest,
        },
    },
    services::evidence_policy::EvidencePolicy,
};

/// Tabela de transições permitidas. PICKED_UP e CANCELLED não têm saída.
pub fn valid_transitions(from: OrderStatus) -> &'static [OrderStatus] {
    use OrderStatus::*;

    match from {
        Draft => &[AwaitingAnalysis, Cancelled],
        AwaitingAnalysis => &[InAnalysis, Cancelled],
        InAnalysis => &[AwaitingApproval, Cancelled],
        AwaitingApproval => &[Approved, Rejected, Cancelled],
        Approved => &[InProgress, Done, Cancelled],
        Rejected => &[AwaitingPickup, Cancelled, AwaitingApproval],
        InProgress => &[Done, AwaitingApproval, Cancelled],
        Done => &[AwaitingPayment, PickedUp, InProgress],
        AwaitingPayment => &[Paid, PickedUp],
        Paid => &[PickedUp],
        AwaitingPickup => &[PickedUp],
        PickedUp | Cancelled => &[],
    }
}

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    valid_transitions(from).contains(&to)
}

pub fn ensure_transition(from: OrderStatus, to: OrderStatus) -> Result<(), AppError> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(AppError::InvalidTransition { from, to })
    }
}

fn ensure_items_editable(order: &ServiceOrder) -> Result<(), AppError> {
    if order.status.locks_items() {
        return Err(AppError::invalid(
            "items",
            format!("itens não podem ser alterados com a OS em {}", order.status),
        ));
    }
    Ok(())
}

pub(crate) fn ensure_open(order: &ServiceOrder) -> Result<(), AppError> {
    if order.status.is_terminal() {
        return Err(AppError::invalid("status", format!("OS #{} está encerrada", order.display_number)));
    }
    Ok(())
}

// Regras de item que valem em qualquer caminho (equipe ou cliente)
fn check_item(item: &ServiceItem) -> Result<(), AppError> {
    check_money("price", item.price)?;
    if item.severity == Severity::Critical && !item.approved {
        return Err(AppError::invalid(
            "approved",
            format!("item crítico '{}' não pode ficar fora do orçamento", item.name),
        ));
    }
    Ok(())
}

fn new_item(request: NewItemRequest) -> Result<ServiceItem, AppError> {
    let item = ServiceItem {
        id: Uuid::new_v4(),
        name: request.name.trim().to_string(),
        price: request.price,
        approved: request.approved.unwrap_or(true),
        severity: request.severity,
        kind: request.kind,
    };
    check_item(&item)?;
    Ok(item)
}

fn snapshot(item: &ServiceItem) -> serde_json::Value {
    serde_json::to_value(item).unwrap_or_default()
}

/// Dono do `status` da OS. Toda mudança de status passa por [`OrderStateMachine::apply_transition`].
#[derive(Clone)]
pub struct OrderStateMachine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    evidence_policy: EvidencePolicy,
}

impl OrderStateMachine {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>, evidence_policy: EvidencePolicy) -> Self {
        Self {
            store,
            clock,
            evidence_policy,
        }
    }

    pub async fn load(&self, tenant_id: Uuid, order_id: Uuid) -> Result<ServiceOrder, AppError> {
        self.store
            .get_order(tenant_id, order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("OS {order_id}")))
    }

    // =========================================================================
    //  TRANSIÇÕES
    // =========================================================================

    /// Valida e aplica a transição em memória: histórico, status e a entrada de auditoria
    /// correspondente. Quem chama persiste com [`OrderStateMachine::commit`].
    pub fn apply_transition(
        &self,
        order: &mut ServiceOrder,
        target: OrderStatus,
        reason: Option<&str>,
        actor: &Actor,
    ) -> Result<AuditLogEntry, AppError> {
        let from = order.status;
        ensure_transition(from, target)?;

        let reason = reason.map(str::trim).filter(|r| !r.is_empty());
        if target.requires_reason() && reason.is_none() {
            return Err(AppError::invalid("reason", format!("motivo obrigatório para {target}")));
        }

        let now = self.clock.now();
        order.status_history.insert(
            0,
            StatusHistoryEntry {
                from,
                to: target,
                timestamp: now,
                actor: actor.name.clone(),
                actor_role: actor.role.clone(),
                reason: reason.map(str::to_string),
            },
        );
        order.status = target;
        order.updated_at = now;
        if target.is_terminal() {
            order.closed_at = Some(now);
        }

        let details = match reason {
            Some(reason) => format!("{from} -> {target}: {reason}"),
            None => format!("{from} -> {target}"),
        };

        Ok(
            AuditLogEntry::new(order.tenant_id, Some(order.id), actor, AuditAction::StatusChanged, details, now)
                .with_changes(json!({ "status": from }), json!({ "status": target })),
        )
    }

    /// Avisos da política de evidências para `target` (vazio quando nada falta).
    pub async fn evidence_warnings(&self, order: &ServiceOrder, target: OrderStatus) -> Result<Vec<String>, AppError> {
        if self.evidence_policy.required_for(target).is_empty() {
            return Ok(Vec::new());
        }

        let present: Vec<EvidenceStage> = self
            .store
            .list_evidence(order.tenant_id, order.id)
            .await?
            .into_iter()
            .filter(|e| e.is_active())
            .map(|e| e.stage)
            .collect();

        let missing = self.evidence_policy.evaluate(target, &present)?;

        Ok(missing
            .into_iter()
            .map(|stage| format!("Evidência {} ausente para {}", stage.as_str(), target))
            .collect())
    }

    /// Grava o agregado com a próxima versão. A escrita é condicional na versão lida.
    pub async fn commit(&self, order: &mut ServiceOrder, audit: &[AuditLogEntry]) -> Result<(), AppError> {
        let expected_version = order.version;
        order.version += 1;
        order.updated_at = self.clock.now();

        let result = self.store.save_order(order, expected_version, audit).await;
        if result.is_err() {
            order.version = expected_version;
        }
        result
    }

    /// Transição completa sobre um agregado já carregado. `extra_audit` vai junto na mesma escrita.
    pub async fn transition(
        &self,
        order: &mut ServiceOrder,
        target: OrderStatus,
        reason: Option<&str>,
        actor: &Actor,
        extra_audit: Vec<AuditLogEntry>,
    ) -> Result<Vec<String>, AppError> {
        ensure_transition(order.status, target)?;
        let warnings = self.evidence_warnings(order, target).await?;

        let entry = self.apply_transition(order, target, reason, actor)?;
        let mut audit = vec![entry];
        audit.extend(extra_audit);

        self.commit(order, &audit).await?;

        tracing::info!(
            "🔁 OS #{} ({}) agora em {} por {}",
            order.display_number,
            order.id,
            target,
            actor.name
        );
        Ok(warnings)
    }

    // =========================================================================
    //  CRIAÇÃO E ITENS
    // =========================================================================

    pub async fn create_order(
        &self,
        tenant_id: Uuid,
        request: CreateOrderRequest,
        actor: &Actor,
    ) -> Result<ServiceOrder, AppError> {
        request.validate()?;

        let items = request
            .items
            .into_iter()
            .map(new_item)
            .collect::<Result<Vec<_>, _>>()?;

        let display_number = self.store.next_display_number(tenant_id).await?;
        let now = self.clock.now();

        let mut order = ServiceOrder {
            id: Uuid::new_v4(),
            tenant_id,
            display_number,
            customer: request.customer.into(),
            device: request.device.trim().to_string(),
            status: OrderStatus::Draft,
            items: Vec::new(),
            total_value: Decimal::ZERO,
            checklist: request.checklist,
            technical_notes: None,
            status_history: Vec::new(),
            version: 0,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };
        order.mutate_items(|current| {
            *current = items;
            Ok(())
        })?;

        let audit = AuditLogEntry::new(
            tenant_id,
            Some(order.id),
            actor,
            AuditAction::OrderCreated,
            format!("OS #{} aberta para {}", display_number, order.customer.name),
            now,
        );
        self.store.insert_order(&order, &audit).await?;

        tracing::info!("📋 OS #{} criada ({})", display_number, order.id);
        Ok(order)
    }

    pub async fn add_item(
        &self,
        order: &mut ServiceOrder,
        request: NewItemRequest,
        actor: &Actor,
    ) -> Result<ServiceItem, AppError> {
        ensure_items_editable(order)?;
        request.validate()?;

        let item = new_item(request)?;
        let total_before = order.total_value();
        order.mutate_items(|items| {
            items.push(item.clone());
            Ok(())
        })?;

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::ItemAdded,
            format!("Item '{}' adicionado", item.name),
            self.clock.now(),
        )
        .with_changes(json!({ "total": total_before }), json!({ "item": snapshot(&item), "total": order.total_value() }));

        self.commit(order, &[audit]).await?;
        Ok(item)
    }

    pub async fn update_item(
        &self,
        order: &mut ServiceOrder,
        item_id: Uuid,
        request: UpdateItemRequest,
        actor: &Actor,
    ) -> Result<ServiceItem, AppError> {
        ensure_items_editable(order)?;
        request.validate()?;

        let (before, after) = order.mutate_items(|items| {
            let item = items
                .iter_mut()
                .find(|item| item.id == item_id)
                .ok_or_else(|| AppError::not_found(format!("Item {item_id}")))?;

            let before = item.clone();
            if let Some(name) = &request.name {
                item.name = name.trim().to_string();
            }
            if let Some(price) = request.price {
                item.price = price;
            }
            if let Some(severity) = request.severity {
                item.severity = severity;
            }
            if let Some(approved) = request.approved {
                item.approved = approved;
            }
            check_item(item)?;

            Ok((before, item.clone()))
        })?;

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::ItemUpdated,
            format!("Item '{}' alterado", after.name),
            self.clock.now(),
        )
        .with_changes(snapshot(&before), snapshot(&after));

        self.commit(order, &[audit]).await?;
        Ok(after)
    }

    pub async fn remove_item(&self, order: &mut ServiceOrder, item_id: Uuid, actor: &Actor) -> Result<(), AppError> {
        ensure_items_editable(order)?;

        let removed = order.mutate_items(|items| {
            let position = items
                .iter()
                .position(|item| item.id == item_id)
                .ok_or_else(|| AppError::not_found(format!("Item {item_id}")))?;
            Ok(items.remove(position))
        })?;

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::ItemRemoved,
            format!("Item '{}' removido", removed.name),
            self.clock.now(),
        )
        .with_changes(snapshot(&removed), serde_json::Value::Null);

        self.commit(order, &[audit]).await
    }

    /// Faz os itens da OS refletirem exatamente o que o cliente assinou: itens do
    /// snapshot voltam com os valores assinados (inclusive os removidos nesse meio
    /// tempo) e itens fora dele saem do orçamento.
    /// Depois disso o total da OS é o total da aprovação. Não grava; devolve a
    /// auditoria quando algo mudou.
    pub fn apply_customer_selection(
        &self,
        order: &mut ServiceOrder,
        snapshot_items: &[ServiceItem],
        actor: &Actor,
    ) -> Result<Option<AuditLogEntry>, AppError> {
        ensure_items_editable(order)?;
        let total_before = order.total_value();

        let (changed, unquoted) = order.mutate_items(|items| {
            let mut changed = 0usize;
            let mut unquoted = 0usize;
            for item in items.iter_mut() {
                match snapshot_items.iter().find(|s| s.id == item.id) {
                    Some(signed) => {
                        if signed != item {
                            check_item(signed)?;
                            *item = signed.clone();
                            changed += 1;
                        }
                    }
                    // Nunca apresentado ao cliente: não entra na cobrança
                    None if item.approved => {
                        item.approved = false;
                        unquoted += 1;
                    }
                    None => {}
                }
            }
            // Removido depois do envio: o que foi assinado volta para a OS
            for signed in snapshot_items {
                if !items.iter().any(|item| item.id == signed.id) {
                    check_item(signed)?;
                    items.push(signed.clone());
                    changed += 1;
                }
            }
            Ok((changed, unquoted))
        })?;

        if unquoted > 0 {
            tracing::warn!(
                "⚠️ OS #{}: {} item(ns) fora da aprovação assinada ficaram fora do orçamento",
                order.display_number,
                unquoted
            );
        }
        let changed = changed + unquoted;

        if changed == 0 {
            return Ok(None);
        }

        Ok(Some(
            AuditLogEntry::new(
                order.tenant_id,
                Some(order.id),
                actor,
                AuditAction::ItemUpdated,
                format!("Seleção do cliente aplicada a {changed} item(ns)"),
                self.clock.now(),
            )
            .with_changes(json!({ "total": total_before }), json!({ "total": order.total_value() })),
        ))
    }

    // =========================================================================
    //  CHECKLIST E NOTAS
    // =========================================================================

    pub async fn set_checklist(
        &self,
        order: &mut ServiceOrder,
        checklist: Vec<ChecklistEntry>,
        actor: &Actor,
    ) -> Result<(), AppError> {
        ensure_open(order)?;
        if checklist.iter().any(|entry| entry.label.trim().is_empty()) {
            return Err(AppError::invalid("checklist", "todo item do checklist precisa de descrição"));
        }

        let before = serde_json::to_value(&order.checklist).unwrap_or_default();
        order.checklist = checklist;
        let after = serde_json::to_value(&order.checklist).unwrap_or_default();

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::ChecklistUpdated,
            "Checklist atualizado",
            self.clock.now(),
        )
        .with_changes(before, after);

        self.commit(order, &[audit]).await
    }

    pub async fn set_technical_notes(
        &self,
        order: &mut ServiceOrder,
        notes: Option<String>,
        actor: &Actor,
    ) -> Result<(), AppError> {
        ensure_open(order)?;

        let notes = notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
        let before = json!(order.technical_notes);
        order.technical_notes = notes;

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::NotesUpdated,
            "Notas técnicas atualizadas",
            self.clock.now(),
        )
        .with_changes(before, json!(order.technical_notes));

        self.commit(order, &[audit]).await
    }
}
