// src/models/order.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::common::{
    error::AppError,
    money::{check_money, checked_sum, validate_money},
};

// --- Enums ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "order_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Draft,
    AwaitingAnalysis,
    InAnalysis,
    AwaitingApproval,
    Approved,
    Rejected,
    InProgress,
    Done,
    AwaitingPayment,
    Paid,
    AwaitingPickup, // Legado: equivale a "pronto para retirada"
    PickedUp,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 13] = [
        OrderStatus::Draft,
        OrderStatus::AwaitingAnalysis,
        OrderStatus::InAnalysis,
        OrderStatus::AwaitingApproval,
        OrderStatus::Approved,
        OrderStatus::Rejected,
        OrderStatus::InProgress,
        OrderStatus::Done,
        OrderStatus::AwaitingPayment,
        OrderStatus::Paid,
        OrderStatus::AwaitingPickup,
        OrderStatus::PickedUp,
        OrderStatus::Cancelled,
    ];

    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::PickedUp | OrderStatus::Cancelled)
    }

    /// Depois que o cliente se comprometeu financeiramente os itens ficam travados.
    pub fn locks_items(self) -> bool {
        self.is_terminal()
            || matches!(
                self,
                OrderStatus::Approved
                    | OrderStatus::InProgress
                    | OrderStatus::Done
                    | OrderStatus::AwaitingPayment
                    | OrderStatus::Paid
                    | OrderStatus::AwaitingPickup
            )
    }

    pub fn requires_reason(self) -> bool {
        matches!(self, OrderStatus::Cancelled | OrderStatus::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::AwaitingAnalysis => "AWAITING_ANALYSIS",
            OrderStatus::InAnalysis => "IN_ANALYSIS",
            OrderStatus::AwaitingApproval => "AWAITING_APPROVAL",
            OrderStatus::Approved => "APPROVED",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::InProgress => "IN_PROGRESS",
            OrderStatus::Done => "DONE",
            OrderStatus::AwaitingPayment => "AWAITING_PAYMENT",
            OrderStatus::Paid => "PAID",
            OrderStatus::AwaitingPickup => "AWAITING_PICKUP",
            OrderStatus::PickedUp => "PICKED_UP",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,    // Obrigatório para o reparo
    Recommended, // Opcional (upsell)
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::Recommended => "recommended",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Part,
    Labor,
}

// --- Structs ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceItem {
    pub id: Uuid,
    #[schema(example = "Troca de tela")]
    pub name: String,
    #[schema(example = "350.00")]
    pub price: Decimal,
    pub approved: bool,
    pub severity: Severity,
    pub kind: ItemKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistEntry {
    #[schema(example = "Liga normalmente")]
    pub label: String,
    pub checked: bool,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerRef {
    pub id: Option<Uuid>,
    #[schema(example = "Maria Souza")]
    pub name: String,
    #[schema(example = "+55 11 99999-8888")]
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    pub actor_role: String,
    pub reason: Option<String>,
}

/// Agregado raiz. `items` e `total_value` só mudam juntos, via [`ServiceOrder::mutate_items`].
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceOrder {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    #[schema(example = 1024)]
    pub display_number: i64,
    #[sqlx(json)]
    pub customer: CustomerRef,
    #[schema(example = "iPhone 12 - tela quebrada")]
    pub device: String,
    pub status: OrderStatus,
    #[sqlx(json)]
    pub(crate) items: Vec<ServiceItem>,
    pub(crate) total_value: Decimal,
    #[sqlx(json)]
    pub checklist: Vec<ChecklistEntry>,
    pub technical_notes: Option<String>,
    #[sqlx(json)]
    pub status_history: Vec<StatusHistoryEntry>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Soma dos itens aprovados; precisa caber na mesma coluna dos preços.
pub fn approved_total(items: &[ServiceItem]) -> Result<Decimal, AppError> {
    let total = checked_sum(
        "total",
        items.iter().filter(|item| item.approved).map(|item| item.price),
    )?;
    check_money("total", total)?;
    Ok(total)
}

impl ServiceOrder {
    pub fn items(&self) -> &[ServiceItem] {
        &self.items
    }

    pub fn total_value(&self) -> Decimal {
        self.total_value
    }

    pub fn item(&self, item_id: Uuid) -> Option<&ServiceItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    /// Aplica a mutação numa cópia e só publica itens + total se tudo der certo.
    pub(crate) fn mutate_items<T, F>(&mut self, mutation: F) -> Result<T, AppError>
    where
        F: FnOnce(&mut Vec<ServiceItem>) -> Result<T, AppError>,
    {
        let mut items = self.items.clone();
        let output = mutation(&mut items)?;

        self.total_value = approved_total(&items)?;
        self.items = items;

        Ok(output)
    }
}

// Visão completa para a tela de detalhes da OS
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: ServiceOrder,
    pub audit_log: Vec<crate::models::audit::AuditLogEntry>,
    pub evidence: Vec<crate::models::evidence::EvidenceGroup>,
    pub payments: crate::models::payment::PaymentSummary,
    pub active_approval: Option<crate::models::approval::ServiceApproval>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionOutcome {
    pub order: ServiceOrder,
    /// Evidências esperadas pela política que não foram encontradas (modo consultivo).
    pub warnings: Vec<String>,
}

// --- Payloads ---

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewItemRequest {
    #[validate(length(min = 1, max = 200, message = "required"))]
    #[schema(example = "Troca de tela")]
    pub name: String,

    #[validate(custom(function = "validate_money"))]
    #[schema(example = "350.00")]
    pub price: Decimal,

    pub severity: Severity,

    pub kind: ItemKind,

    /// Padrão: incluído no orçamento
    #[serde(default)]
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    #[validate(length(min = 1, max = 200, message = "required"))]
    pub name: Option<String>,
    #[validate(custom(function = "validate_money"))]
    pub price: Option<Decimal>,
    pub severity: Option<Severity>,
    pub approved: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(nested)]
    pub customer: CustomerPayload,

    #[validate(length(min = 1, max = 300, message = "required"))]
    #[schema(example = "iPhone 12 - tela quebrada")]
    pub device: String,

    #[serde(default)]
    #[validate(nested)]
    pub items: Vec<NewItemRequest>,

    #[serde(default)]
    pub checklist: Vec<ChecklistEntry>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CustomerPayload {
    pub id: Option<Uuid>,

    #[validate(length(min = 1, max = 160, message = "required"))]
    pub name: String,

    pub phone: Option<String>,

    #[validate(email)]
    pub email: Option<String>,
}

impl From<CustomerPayload> for CustomerRef {
    fn from(payload: CustomerPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name.trim().to_string(),
            phone: payload.phone,
            email: payload.email,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRequest {
    #[schema(example = "IN_ANALYSIS")]
    pub target_status: OrderStatus,

    pub reason: Option<String>,

    /// Obrigatório para entregar um aparelho com saldo em aberto
    #[serde(default)]
    pub confirm_underpaid: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChecklistRequest {
    pub checklist: Vec<ChecklistEntry>,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TechnicalNotesRequest {
    #[validate(length(max = 10000))]
    pub technical_notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(value: i64) -> Decimal {
        Decimal::new(value, 0)
    }

    fn item(price: i64, approved: bool, severity: Severity) -> ServiceItem {
        ServiceItem {
            id: Uuid::new_v4(),
            name: "peça".into(),
            price: dec(price),
            approved,
            severity,
            kind: ItemKind::Part,
        }
    }

    #[test]
    fn approved_total_ignores_declined_items() {
        let items = vec![
            item(100, true, Severity::Critical),
            item(50, false, Severity::Recommended),
            item(30, true, Severity::Recommended),
        ];

        assert_eq!(approved_total(&items).unwrap(), dec(130));
    }

    #[test]
    fn terminal_states_lock_items() {
        for status in OrderStatus::ALL {
            if status.is_terminal() {
                assert!(status.locks_items());
            }
        }
        assert!(!OrderStatus::AwaitingApproval.locks_items());
        assert!(OrderStatus::Approved.locks_items());
    }
}
