// src/models/audit.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::auth::Actor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "audit_action", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    OrderCreated,
    StatusChanged,
    ItemAdded,
    ItemUpdated,
    ItemRemoved,
    ChecklistUpdated,
    NotesUpdated,
    ApprovalRequested,
    ApprovalApproved,
    ApprovalRejected,
    ReceiptGenerated,
    EvidenceUploaded,
    EvidenceRetired,
    EvidenceRetireDenied,
    PaymentRecorded,
    UnderpaidWithdrawalConfirmed,
}

/// Entrada append-only. Nunca é editada nem removida.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub order_id: Option<Uuid>,
    pub action: AuditAction,
    pub timestamp: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    pub actor_name: String,
    pub actor_role: String,
    pub details: String,
    /// Diferença antes/depois, quando fizer sentido
    pub changes: Option<serde_json::Value>,
}

impl AuditLogEntry {
    pub fn new(
        tenant_id: Uuid,
        order_id: Option<Uuid>,
        actor: &Actor,
        action: AuditAction,
        details: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            order_id,
            action,
            timestamp,
            actor_id: actor.id,
            actor_name: actor.name.clone(),
            actor_role: actor.role.clone(),
            details: details.into(),
            changes: None,
        }
    }

    pub fn with_changes(mut self, before: serde_json::Value, after: serde_json::Value) -> Self {
        self.changes = Some(serde_json::json!({ "before": before, "after": after }));
        self
    }
}
