// src/services/evidence_service.rs

use std::{path::Path, sync::Arc};

use uuid::Uuid;

use crate::{
    common::{clock::Clock, error::AppError, hashing::digest_bytes},
    db::{BlobStorage, Store},
    models::{
        audit::{AuditAction, AuditLogEntry},
        auth::Actor,
        evidence::{Evidence, EvidenceCheck, EvidenceGroup, EvidenceLifecycle, EvidenceStage, UploadedFile},
        order::ServiceOrder,
    },
    services::state_machine::ensure_open,
};

pub const MAX_EVIDENCE_BYTES: usize = 20 * 1024 * 1024;

/// Evidências ativas agrupadas por etapa, na ordem de declaração das etapas.
pub fn group_active(evidence: Vec<Evidence>) -> Vec<EvidenceGroup> {
    let active: Vec<Evidence> = evidence.into_iter().filter(Evidence::is_active).collect();

    EvidenceStage::ALL
        .into_iter()
        .filter_map(|stage| {
            let items: Vec<Evidence> = active.iter().filter(|e| e.stage == stage).cloned().collect();
            (!items.is_empty()).then_some(EvidenceGroup { stage, items })
        })
        .collect()
}

fn extension(file_name: &str) -> String {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

#[derive(Clone)]
pub struct EvidenceService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStorage>,
    clock: Arc<dyn Clock>,
}

impl EvidenceService {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStorage>, clock: Arc<dyn Clock>) -> Self {
        Self { store, blobs, clock }
    }

    /// Calcula o digest, grava o binário e devolve o registro ainda não persistido.
    pub async fn prepare(
        &self,
        order: &ServiceOrder,
        file: UploadedFile,
        stage: EvidenceStage,
        description: &str,
        uploaded_by: &str,
    ) -> Result<Evidence, AppError> {
        ensure_open(order)?;

        if file.bytes.is_empty() {
            return Err(AppError::invalid("file", "arquivo vazio"));
        }
        if file.bytes.len() > MAX_EVIDENCE_BYTES {
            return Err(AppError::invalid("file", "arquivo maior que 20 MB"));
        }

        let id = Uuid::new_v4();
        let file_hash = digest_bytes(&file.bytes);
        let storage_key = format!(
            "{}/orders/{}/evidence/{}{}",
            order.tenant_id,
            order.id,
            id,
            extension(&file.file_name)
        );

        let url = self.blobs.put(&storage_key, &file.bytes, &file.content_type).await?;

        Ok(Evidence {
            id,
            tenant_id: order.tenant_id,
            order_id: order.id,
            stage,
            url,
            storage_key,
            description: description.trim().to_string(),
            file_hash,
            content_type: file.content_type,
            size_bytes: file.bytes.len() as i64,
            uploaded_by: uploaded_by.to_string(),
            uploaded_at: self.clock.now(),
            lifecycle: EvidenceLifecycle::Active,
            retired_at: None,
            retired_by: None,
        })
    }

    pub async fn upload(
        &self,
        order: &ServiceOrder,
        file: UploadedFile,
        stage: EvidenceStage,
        description: &str,
        actor: &Actor,
    ) -> Result<Evidence, AppError> {
        let evidence = self.prepare(order, file, stage, description, &actor.name).await?;

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::EvidenceUploaded,
            format!("Evidência {} anexada ({})", stage.as_str(), evidence.file_hash),
            evidence.uploaded_at,
        );
        self.store.insert_evidence(&evidence, &audit).await?;

        tracing::info!("📎 Evidência {} anexada à OS #{}", evidence.id, order.display_number);
        Ok(evidence)
    }

    pub async fn get(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<Evidence, AppError> {
        self.store
            .get_evidence(tenant_id, evidence_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Evidência {evidence_id}")))
    }

    pub async fn grouped(&self, tenant_id: Uuid, order_id: Uuid) -> Result<Vec<EvidenceGroup>, AppError> {
        let evidence = self.store.list_evidence(tenant_id, order_id).await?;
        Ok(group_active(evidence))
    }

    /// Exclusão lógica: o registro e o hash permanecem.
    pub async fn retire(&self, order: &ServiceOrder, evidence_id: Uuid, actor: &Actor) -> Result<Evidence, AppError> {
        ensure_open(order)?;

        let evidence = self.get(order.tenant_id, evidence_id).await?;
        if evidence.order_id != order.id {
            return Err(AppError::not_found(format!("Evidência {evidence_id}")));
        }

        let now = self.clock.now();
        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::EvidenceRetired,
            format!("Evidência {} retirada ({})", evidence_id, evidence.file_hash),
            now,
        );

        let retired = self
            .store
            .retire_evidence(order.tenant_id, evidence_id, now, &actor.name, &audit)
            .await?;

        tracing::info!("🗑️ Evidência {} retirada por {}", evidence_id, actor.name);
        Ok(retired)
    }

    /// Relê o binário e compara o digest com o gravado no registro.
    pub async fn verify_digest(&self, tenant_id: Uuid, evidence_id: Uuid) -> Result<EvidenceCheck, AppError> {
        let evidence = self.get(tenant_id, evidence_id).await?;

        let blob = self
            .blobs
            .get(&evidence.storage_key)
            .await?
            .ok_or_else(|| AppError::IntegrityFailure(format!("binário da evidência {evidence_id} não encontrado")))?;

        let computed_hash = digest_bytes(&blob.bytes);
        let matches = computed_hash == evidence.file_hash;
        if !matches {
            tracing::warn!("⚠️ Evidência {} não confere com o hash gravado", evidence_id);
        }

        Ok(EvidenceCheck {
            evidence_id,
            stored_hash: evidence.file_hash,
            computed_hash,
            matches,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn evidence(stage: EvidenceStage, lifecycle: EvidenceLifecycle) -> Evidence {
        Evidence {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            order_id: Uuid::nil(),
            stage,
            url: "memory://x".into(),
            storage_key: "x".into(),
            description: String::new(),
            file_hash: "00".into(),
            content_type: "image/png".into(),
            size_bytes: 1,
            uploaded_by: "Ana".into(),
            uploaded_at: Utc::now(),
            lifecycle,
            retired_at: None,
            retired_by: None,
        }
    }

    #[test]
    fn grouping_follows_stage_order_and_skips_retired() {
        let groups = group_active(vec![
            evidence(EvidenceStage::Entrega, EvidenceLifecycle::Active),
            evidence(EvidenceStage::Entrada, EvidenceLifecycle::Active),
            evidence(EvidenceStage::Processo, EvidenceLifecycle::Retired),
            evidence(EvidenceStage::Entrada, EvidenceLifecycle::Active),
        ]);

        let stages: Vec<EvidenceStage> = groups.iter().map(|g| g.stage).collect();
        assert_eq!(stages, vec![EvidenceStage::Entrada, EvidenceStage::Entrega]);
        assert_eq!(groups[0].items.len(), 2);
    }

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(extension("foto.JPG"), ".jpg");
        assert_eq!(extension("sem_extensao"), "");
        assert_eq!(extension("x.p/ng"), "");
    }
}
