// tests/evidence_ledger.rs

mod common;

use ordem_servico::{
    common::error::AppError,
    db::BlobStorage,
    models::{
        audit::AuditAction,
        evidence::{EvidenceLifecycle, EvidenceStage, UploadedFile},
        order::{OrderStatus, TransitionRequest},
    },
    services::evidence_policy::PolicyMode,
};
use sha2::{Digest, Sha256};

use common::Harness;

fn photo(bytes: &[u8]) -> UploadedFile {
    UploadedFile {
        file_name: "entrada.JPG".into(),
        content_type: "image/jpeg".into(),
        bytes: bytes.to_vec(),
    }
}

fn to(target: OrderStatus) -> TransitionRequest {
    TransitionRequest {
        target_status: target,
        reason: None,
        confirm_underpaid: false,
    }
}

#[tokio::test]
async fn upload_records_the_content_digest() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;
    let bytes = b"foto do aparelho na entrada";

    let evidence = h
        .desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(bytes), EvidenceStage::Entrada, " Tela trincada ")
        .await
        .unwrap();

    assert_eq!(evidence.file_hash, hex::encode(Sha256::digest(bytes)));
    assert_eq!(evidence.size_bytes, bytes.len() as i64);
    assert_eq!(evidence.description, "Tela trincada");
    assert!(evidence.storage_key.ends_with(".jpg"));
    assert_eq!(evidence.lifecycle, EvidenceLifecycle::Active);

    let stored = h.blobs.get(&evidence.storage_key).await.unwrap().expect("binário gravado");
    assert_eq!(stored.bytes, bytes.to_vec());

    let audit = h.desk.list_audit(&h.manager, h.tenant_id, order.id).await.unwrap();
    assert_eq!(audit[0].action, AuditAction::EvidenceUploaded);
}

#[tokio::test]
async fn empty_files_are_refused() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;

    let err = h
        .desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(b""), EvidenceStage::Entrada, "")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { ref field, .. } if field == "file"));
}

#[tokio::test]
async fn retiring_needs_permission_and_keeps_the_record() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;
    let evidence = h
        .desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(b"foto"), EvidenceStage::Entrada, "")
        .await
        .unwrap();

    let err = h
        .desk
        .retire_evidence(&h.technician, h.tenant_id, evidence.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let audit = h.desk.list_audit(&h.manager, h.tenant_id, order.id).await.unwrap();
    assert_eq!(audit[0].action, AuditAction::EvidenceRetireDenied);
    assert_eq!(audit[0].actor_name, "Tiago Técnico");

    let retired = h
        .desk
        .retire_evidence(&h.manager, h.tenant_id, evidence.id)
        .await
        .unwrap();
    assert_eq!(retired.lifecycle, EvidenceLifecycle::Retired);
    assert_eq!(retired.retired_by.as_deref(), Some("Carla Gerente"));

    // Continua consultável por id, com o mesmo hash
    let fetched = h.desk.get_evidence(&h.technician, h.tenant_id, evidence.id).await.unwrap();
    assert_eq!(fetched.file_hash, evidence.file_hash);
    assert!(fetched.retired_at.is_some());

    let detail = h.desk.order_detail(&h.technician, h.tenant_id, order.id).await.unwrap();
    assert!(detail.evidence.is_empty());
}

#[tokio::test]
async fn verification_detects_a_swapped_file() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;
    let evidence = h
        .desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(b"original"), EvidenceStage::Entrada, "")
        .await
        .unwrap();

    let check = h.desk.verify_evidence(&h.manager, h.tenant_id, evidence.id).await.unwrap();
    assert!(check.matches);

    h.blobs
        .inner
        .put(&evidence.storage_key, b"editada", "image/jpeg")
        .await
        .unwrap();

    let check = h.desk.verify_evidence(&h.manager, h.tenant_id, evidence.id).await.unwrap();
    assert!(!check.matches);
    assert_eq!(check.stored_hash, evidence.file_hash);
    assert_ne!(check.computed_hash, check.stored_hash);
}

#[tokio::test]
async fn enforced_policy_blocks_analysis_without_intake_photos() {
    let h = Harness::builder().policy(PolicyMode::Enforced).build().await;
    let order = h.create_order(Vec::new()).await;
    h.advance(order.id, OrderStatus::AwaitingAnalysis).await;

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::InAnalysis))
        .await
        .unwrap_err();
    match err {
        AppError::MissingEvidence { target, missing } => {
            assert_eq!(target, OrderStatus::InAnalysis);
            assert_eq!(missing, vec![EvidenceStage::Entrada]);
        }
        other => panic!("esperava MissingEvidence, veio {other:?}"),
    }

    h.desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(b"entrada"), EvidenceStage::Entrada, "")
        .await
        .unwrap();

    let outcome = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::InAnalysis))
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::InAnalysis);
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn advisory_policy_warns_and_proceeds() {
    let h = Harness::builder().policy(PolicyMode::Advisory).build().await;
    let order = h.create_order(Vec::new()).await;
    h.advance(order.id, OrderStatus::AwaitingAnalysis).await;

    let outcome = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::InAnalysis))
        .await
        .unwrap();

    assert_eq!(outcome.order.status, OrderStatus::InAnalysis);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("ENTRADA"));
}

#[tokio::test]
async fn retired_photos_do_not_satisfy_the_policy() {
    let h = Harness::builder().policy(PolicyMode::Enforced).build().await;
    let order = h.create_order(Vec::new()).await;
    h.advance(order.id, OrderStatus::AwaitingAnalysis).await;

    let evidence = h
        .desk
        .upload_evidence(&h.technician, h.tenant_id, order.id, photo(b"entrada"), EvidenceStage::Entrada, "")
        .await
        .unwrap();
    h.desk
        .retire_evidence(&h.manager, h.tenant_id, evidence.id)
        .await
        .unwrap();

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::InAnalysis))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingEvidence { .. }));
}
