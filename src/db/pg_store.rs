// src/db/pg_store.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{types::Json, Executor, PgPool, Postgres};
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

const ORDER_COLUMNS: &str = r#"
    id, tenant_id, display_number, customer, device, status, items, total_value,
    checklist, technical_notes, status_history, version, created_at, updated_at, closed_at
"#;

const APPROVAL_COLUMNS: &str = r#"
    id, order_id, tenant_id, token, description, items_snapshot, total_value, status, channel,
    requested_by, created_at, responded_at, rejection_reason, digital_signature_id,
    receipt_url, verification_hash, warranty_terms
"#;

const EVIDENCE_COLUMNS: &str = r#"
    id, tenant_id, order_id, stage, url, storage_key, description, file_hash, content_type,
    size_bytes, uploaded_by, uploaded_at, lifecycle, retired_at, retired_by
"#;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  ESCRITAS AUXILIARES (rodam dentro da transação de quem chama)
    // =========================================================================

    async fn write_audit<'e, E>(&self, executor: E, entry: &AuditLogEntry) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO audit_log (
                id, tenant_id, order_id, action, timestamp,
                actor_id, actor_name, actor_role, details, changes
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(entry.id)
        .bind(entry.tenant_id)
        .bind(entry.order_id)
        .bind(entry.action)
        .bind(entry.timestamp)
        .bind(entry.actor_id)
        .bind(&entry.actor_name)
        .bind(&entry.actor_role)
        .bind(&entry.details)
        .bind(&entry.changes)
        .execute(executor)
        .await?;

        Ok(())
    }

    /// UPDATE condicional na versão. Zero linhas afetadas = alguém gravou antes.
    async fn write_order_if_version<'e, E>(
        &self,
        executor: E,
        order: &ServiceOrder,
        expected_version: i64,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            UPDATE service_orders SET
                customer = $3, device = $4, status = $5, items = $6, total_value = $7,
                checklist = $8, technical_notes = $9, status_history = $10,
                version = $11, updated_at = $12, closed_at = $13
            WHERE tenant_id = $1 AND id = $2 AND version = $14
            "#,
        )
        .bind(order.tenant_id)
        .bind(order.id)
        .bind(Json(&order.customer))
        .bind(&order.device)
        .bind(order.status)
        .bind(Json(order.items()))
        .bind(order.total_value())
        .bind(Json(&order.checklist))
        .bind(&order.technical_notes)
        .bind(Json(&order.status_history))
        .bind(order.version)
        .bind(order.updated_at)
        .bind(order.closed_at)
        .bind(expected_version)
        .execute(executor)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict(format!(
                "OS {} mudou desde a leitura (versão esperada {expected_version})",
                order.id
            )));
        }
        Ok(())
    }

    async fn write_evidence<'e, E>(&self, executor: E, evidence: &Evidence) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO evidence (
                id, tenant_id, order_id, stage, url, storage_key, description, file_hash,
                content_type, size_bytes, uploaded_by, uploaded_at, lifecycle, retired_at, retired_by
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(evidence.id)
        .bind(evidence.tenant_id)
        .bind(evidence.order_id)
        .bind(evidence.stage)
        .bind(&evidence.url)
        .bind(&evidence.storage_key)
        .bind(&evidence.description)
        .bind(&evidence.file_hash)
        .bind(&evidence.content_type)
        .bind(evidence.size_bytes)
        .bind(&evidence.uploaded_by)
        .bind(evidence.uploaded_at)
        .bind(evidence.lifecycle)
        .bind(evidence.retired_at)
        .bind(&evidence.retired_by)
        .execute(executor)
        .await?;

        Ok(())
    }
}

// Violação de UNIQUE vira conflito de negócio, não erro interno.
fn unique_violation_as_conflict(err: sqlx::Error, what: &str) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(what.to_string()),
        _ => AppError::DatabaseError(err),
    }
}

#[async_trait]
impl Store for PgStore {
    // --- ORDENS ---

    async fn next_display_number(&self, tenant_id: Uuid) -> Result<i64, AppError> {
        let number: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO order_counters (tenant_id, last_number)
            VALUES ($1, 1)
            ON CONFLICT (tenant_id)
            DO UPDATE SET last_number = order_counters.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(tenant_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(number)
    }

    async fn insert_order(&self, order: &ServiceOrder, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO service_orders (
                id, tenant_id, display_number, customer, device, status, items, total_value,
                checklist, technical_notes, status_history, version, created_at, updated_at, closed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(order.id)
        .bind(order.tenant_id)
        .bind(order.display_number)
        .bind(Json(&order.customer))
        .bind(&order.device)
        .bind(order.status)
        .bind(Json(order.items()))
        .bind(order.total_value())
        .bind(Json(&order.checklist))
        .bind(&order.technical_notes)
        .bind(Json(&order.status_history))
        .bind(order.version)
        .bind(order.created_at)
        .bind(order.updated_at)
        .bind(order.closed_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation_as_conflict(e, "número de OS já utilizado"))?;

        self.write_audit(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_order(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceOrder>, AppError> {
        let order = sqlx::query_as::<_, ServiceOrder>(&format!(
            "SELECT {ORDER_COLUMNS} FROM service_orders WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(order)
    }

    async fn save_order(
        &self,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        self.write_order_if_version(&mut *tx, order, expected_version).await?;
        for entry in audit {
            self.write_audit(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    // --- AUDITORIA ---

    async fn append_audit(&self, entry: &AuditLogEntry) -> Result<(), AppError> {
        self.write_audit(&self.pool, entry).await
    }

    async fn list_audit(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<AuditLogEntry>, AppError> {
        let entries = sqlx::query_as::<_, AuditLogEntry>(
            r#"
            SELECT id, tenant_id, order_id, action, timestamp,
                   actor_id, actor_name, actor_role, details, changes
            FROM audit_log
            WHERE tenant_id = $1 AND order_id = $2
            ORDER BY timestamp DESC
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    // --- APROVAÇÕES ---

    async fn open_approval(
        &self,
        approval: &ServiceApproval,
        order: &ServiceOrder,
        expected_version: i64,
        audit: &[AuditLogEntry],
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        self.write_order_if_version(&mut *tx, order, expected_version).await?;

        sqlx::query(
            r#"
            INSERT INTO service_approvals (
                id, order_id, tenant_id, token, description, items_snapshot, total_value,
                status, channel, requested_by, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(approval.id)
        .bind(approval.order_id)
        .bind(approval.tenant_id)
        .bind(&approval.token)
        .bind(&approval.description)
        .bind(Json(&approval.items_snapshot))
        .bind(approval.total_value)
        .bind(approval.status)
        .bind(approval.channel)
        .bind(&approval.requested_by)
        .bind(approval.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| unique_violation_as_conflict(e, "OS já possui aprovação pendente"))?;

        for entry in audit {
            self.write_audit(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn get_approval(&self, tenant_id: Uuid, approval_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        let approval = sqlx::query_as::<_, ServiceApproval>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM service_approvals WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(approval_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(approval)
    }

    async fn find_approval_by_token(&self, token: &str) -> Result<Option<ServiceApproval>, AppError> {
        let approval = sqlx::query_as::<_, ServiceApproval>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM service_approvals WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(approval)
    }

    async fn find_approval_by_hash(&self, verification_hash: &str) -> Result<Option<ServiceApproval>, AppError> {
        let approval = sqlx::query_as::<_, ServiceApproval>(&format!(
            "SELECT {APPROVAL_COLUMNS} FROM service_approvals WHERE verification_hash = $1"
        ))
        .bind(verification_hash)
        .fetch_optional(&self.pool)
        .await?;

        Ok(approval)
    }

    async fn latest_approval(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Option<ServiceApproval>, AppError> {
        let approval = sqlx::query_as::<_, ServiceApproval>(&format!(
            r#"
            SELECT {APPROVAL_COLUMNS} FROM service_approvals
            WHERE tenant_id = $1 AND order_id = $2
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(approval)
    }

    async fn close_approval(&self, closing: &ApprovalClosing<'_>) -> Result<(), AppError> {
        let approval = closing.approval;
        let mut tx = self.pool.begin().await?;

        // Check-then-set no próprio UPDATE: só uma resposta vence
        let result = sqlx::query(
            r#"
            UPDATE service_approvals SET
                items_snapshot = $3, total_value = $4, status = $5, channel = $6,
                responded_at = $7, rejection_reason = $8, digital_signature_id = $9,
                receipt_url = $10, verification_hash = $11, warranty_terms = $12
            WHERE tenant_id = $1 AND id = $2 AND status = $13
            "#,
        )
        .bind(approval.tenant_id)
        .bind(approval.id)
        .bind(Json(&approval.items_snapshot))
        .bind(approval.total_value)
        .bind(approval.status)
        .bind(approval.channel)
        .bind(approval.responded_at)
        .bind(&approval.rejection_reason)
        .bind(approval.digital_signature_id)
        .bind(&approval.receipt_url)
        .bind(&approval.verification_hash)
        .bind(&approval.warranty_terms)
        .bind(ApprovalStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<Uuid> =
                sqlx::query_scalar("SELECT id FROM service_approvals WHERE tenant_id = $1 AND id = $2")
                    .bind(approval.tenant_id)
                    .bind(approval.id)
                    .fetch_optional(&mut *tx)
                    .await?;

            return Err(match exists {
                Some(_) => AppError::AlreadyResponded,
                None => AppError::not_found(format!("Aprovação {}", approval.id)),
            });
        }

        if let Some(evidence) = closing.evidence {
            self.write_evidence(&mut *tx, evidence).await?;
        }

        if let Some(signature) = closing.signature {
            sqlx::query(
                r#"
                INSERT INTO digital_signatures (
                    id, approval_id, tenant_id, artifact, signer_name, signer_document,
                    terms_accepted, client_ip, user_agent, signed_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(signature.id)
            .bind(signature.approval_id)
            .bind(signature.tenant_id)
            .bind(Json(&signature.artifact))
            .bind(&signature.signer_name)
            .bind(&signature.signer_document)
            .bind(signature.terms_accepted)
            .bind(&signature.client_ip)
            .bind(&signature.user_agent)
            .bind(signature.signed_at)
            .execute(&mut *tx)
            .await?;
        }

        for entry in closing.audit {
            self.write_audit(&mut *tx, entry).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn set_receipt_url(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
        receipt_url: &str,
        audit: &AuditLogEntry,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE service_approvals SET receipt_url = $3
            WHERE tenant_id = $1 AND id = $2 AND status <> $4
            "#,
        )
        .bind(tenant_id)
        .bind(approval_id)
        .bind(receipt_url)
        .bind(ApprovalStatus::Pending)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Aprovação respondida {approval_id}")));
        }

        self.write_audit(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_signature(&self, tenant_id: Uuid, signature_id: Uuid) -> Result<Option<DigitalSignature>, AppError> {
        let signature = sqlx::query_as::<_, DigitalSignature>(
            r#"
            SELECT id, approval_id, tenant_id, artifact, signer_name, signer_document,
                   terms_accepted, client_ip, user_agent, signed_at
            FROM digital_signatures
            WHERE tenant_id = $1 AND id = $2
            "#,
        )
        .bind(tenant_id)
        .bind(signature_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(signature)
    }

    // --- EVIDÊNCIAS ---

    async fn insert_evidence(&self, evidence: &Evidence, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        self.write_evidence(&mut *tx, evidence).await?;
        self.write_audit(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn get_evidence(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<Option<Evidence>, AppError> {
        let evidence = sqlx::query_as::<_, Evidence>(&format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE tenant_id = $1 AND id = $2"
        ))
        .bind(tenant_id)
        .bind(evidence_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(evidence)
    }

    async fn list_evidence(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<Evidence>, AppError> {
        let evidence = sqlx::query_as::<_, Evidence>(&format!(
            "SELECT {EVIDENCE_COLUMNS} FROM evidence WHERE tenant_id = $1 AND order_id = $2 ORDER BY uploaded_at"
        ))
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

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
        let mut tx = self.pool.begin().await?;

        let retired = sqlx::query_as::<_, Evidence>(&format!(
            r#"
            UPDATE evidence SET lifecycle = $3, retired_at = $4, retired_by = $5
            WHERE tenant_id = $1 AND id = $2 AND lifecycle = $6
            RETURNING {EVIDENCE_COLUMNS}
            "#
        ))
        .bind(tenant_id)
        .bind(evidence_id)
        .bind(EvidenceLifecycle::Retired)
        .bind(retired_at)
        .bind(retired_by)
        .bind(EvidenceLifecycle::Active)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(retired) = retired else {
            let exists: Option<Uuid> = sqlx::query_scalar("SELECT id FROM evidence WHERE tenant_id = $1 AND id = $2")
                .bind(tenant_id)
                .bind(evidence_id)
                .fetch_optional(&mut *tx)
                .await?;

            return Err(match exists {
                Some(_) => AppError::Conflict(format!("Evidência {evidence_id} já foi retirada")),
                None => AppError::not_found(format!("Evidência {evidence_id}")),
            });
        };

        self.write_audit(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(retired)
    }

    // --- PAGAMENTOS ---

    async fn insert_payment(&self, payment: &ServicePayment, audit: &AuditLogEntry) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO service_payments (id, tenant_id, order_id, amount, method, notes, paid_at, recorded_by)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(payment.id)
        .bind(payment.tenant_id)
        .bind(payment.order_id)
        .bind(payment.amount)
        .bind(payment.method)
        .bind(&payment.notes)
        .bind(payment.paid_at)
        .bind(&payment.recorded_by)
        .execute(&mut *tx)
        .await?;

        self.write_audit(&mut *tx, audit).await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_payments(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<ServicePayment>, AppError> {
        let payments = sqlx::query_as::<_, ServicePayment>(
            r#"
            SELECT id, tenant_id, order_id, amount, method, notes, paid_at, recorded_by
            FROM service_payments
            WHERE tenant_id = $1 AND order_id = $2
            ORDER BY paid_at
            "#,
        )
        .bind(tenant_id)
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(payments)
    }

    // --- CONFIGURAÇÕES DA LOJA ---

    async fn get_settings(&self, tenant_id: Uuid) -> Result<ShopSettings, AppError> {
        let settings = sqlx::query_as::<_, ShopSettings>(
            r#"
            SELECT tenant_id, company_name, document_number, address, phone, warranty_terms, updated_at
            FROM shop_settings
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        // Loja sem configuração ainda: tratamos como vazia
        Ok(settings.unwrap_or_else(|| ShopSettings::empty(tenant_id)))
    }

    async fn put_settings(&self, settings: &ShopSettings) -> Result<(), AppError> {
        // UPSERT (Insert or Update)
        sqlx::query(
            r#"
            INSERT INTO shop_settings (
                tenant_id, company_name, document_number, address, phone, warranty_terms, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (tenant_id)
            DO UPDATE SET
                company_name = EXCLUDED.company_name,
                document_number = EXCLUDED.document_number,
                address = EXCLUDED.address,
                phone = EXCLUDED.phone,
                warranty_terms = EXCLUDED.warranty_terms,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(settings.tenant_id)
        .bind(&settings.company_name)
        .bind(&settings.document_number)
        .bind(&settings.address)
        .bind(&settings.phone)
        .bind(&settings.warranty_terms)
        .bind(settings.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
