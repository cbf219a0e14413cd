// tests/order_lifecycle.rs

mod common;

use ordem_servico::{
    common::error::AppError,
    models::{
        approval::{ClientMetadata, CreateApprovalRequest, InPersonApprovalRequest},
        audit::AuditAction,
        order::{
            ChecklistEntry, CreateOrderRequest, CustomerPayload, OrderStatus, ServiceOrder, Severity, TransitionRequest,
            UpdateItemRequest,
        },
        payment::{PaymentMethod, RecordPaymentRequest},
    },
};

use rust_decimal::Decimal;

use common::{dec, item, signature, Harness};

fn to(target: OrderStatus) -> TransitionRequest {
    TransitionRequest {
        target_status: target,
        reason: None,
        confirm_underpaid: false,
    }
}

async fn approved_order(h: &Harness) -> ServiceOrder {
    let order = h.analysed_order().await;
    h.desk
        .register_in_person_approval(
            &h.technician,
            h.tenant_id,
            order.id,
            InPersonApprovalRequest {
                selections: Vec::new(),
                signature: signature("Maria Souza"),
            },
            ClientMetadata::default(),
        )
        .await
        .unwrap();
    h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap()
}

#[tokio::test]
async fn new_orders_start_as_numbered_drafts() {
    let h = Harness::new().await;
    let first = h.create_order(vec![item("Tela", 100, Severity::Critical)]).await;
    let second = h.create_order(Vec::new()).await;

    assert_eq!(first.status, OrderStatus::Draft);
    assert_eq!(first.total_value(), dec(100));
    assert_eq!(second.display_number, first.display_number + 1);

    let audit = h.desk.list_audit(&h.manager, h.tenant_id, first.id).await.unwrap();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].action, AuditAction::OrderCreated);
}

#[tokio::test]
async fn full_lifecycle_until_pickup() {
    let h = Harness::new().await;
    let order = approved_order(&h).await;
    assert_eq!(order.status, OrderStatus::Approved);

    h.advance(order.id, OrderStatus::InProgress).await;
    h.advance(order.id, OrderStatus::Done).await;
    h.advance(order.id, OrderStatus::AwaitingPayment).await;

    h.desk
        .record_payment(
            &h.technician,
            h.tenant_id,
            order.id,
            RecordPaymentRequest {
                amount: dec(150),
                method: PaymentMethod::Pix,
                notes: None,
            },
        )
        .await
        .unwrap();

    let order = h.advance(order.id, OrderStatus::PickedUp).await;
    assert_eq!(order.status, OrderStatus::PickedUp);
    assert!(order.closed_at.is_some());

    // Histórico mais recente primeiro
    let path: Vec<OrderStatus> = order.status_history.iter().rev().map(|entry| entry.to).collect();
    assert_eq!(
        path,
        vec![
            OrderStatus::AwaitingAnalysis,
            OrderStatus::InAnalysis,
            OrderStatus::AwaitingApproval,
            OrderStatus::Approved,
            OrderStatus::InProgress,
            OrderStatus::Done,
            OrderStatus::AwaitingPayment,
            OrderStatus::Paid,
            OrderStatus::PickedUp,
        ]
    );

    for target in OrderStatus::ALL {
        let err = h
            .desk
            .request_transition(&h.technician, h.tenant_id, order.id, to(target))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }), "{target} saiu de PICKED_UP");
    }
}

#[tokio::test]
async fn invalid_transition_reports_both_states() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::Done))
        .await
        .unwrap_err();

    match err {
        AppError::InvalidTransition { from, to } => {
            assert_eq!(from, OrderStatus::Draft);
            assert_eq!(to, OrderStatus::Done);
        }
        other => panic!("esperava InvalidTransition, veio {other:?}"),
    }
}

#[tokio::test]
async fn approval_states_are_reserved_for_the_approval_flow() {
    let h = Harness::new().await;
    let order = h.analysed_order().await;

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::AwaitingApproval))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { .. }));

    let order = h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap();
    assert_eq!(order.status, OrderStatus::InAnalysis);
}

#[tokio::test]
async fn cancellation_needs_a_reason() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::Cancelled))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { .. }));

    let cancelled = h
        .desk
        .request_transition(
            &h.technician,
            h.tenant_id,
            order.id,
            TransitionRequest {
                target_status: OrderStatus::Cancelled,
                reason: Some("Cliente desistiu".into()),
                confirm_underpaid: false,
            },
        )
        .await
        .unwrap()
        .order;
    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.status_history[0].reason.as_deref(), Some("Cliente desistiu"));
}

#[tokio::test]
async fn underpaid_pickup_requires_confirmation() {
    let h = Harness::new().await;
    let order = approved_order(&h).await;
    h.advance(order.id, OrderStatus::InProgress).await;
    h.advance(order.id, OrderStatus::Done).await;

    h.desk
        .record_payment(
            &h.technician,
            h.tenant_id,
            order.id,
            RecordPaymentRequest {
                amount: dec(100),
                method: PaymentMethod::Cash,
                notes: None,
            },
        )
        .await
        .unwrap();

    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::PickedUp))
        .await
        .unwrap_err();
    match err {
        AppError::UnderpaidWithdrawal { balance } => assert_eq!(balance, dec(50)),
        other => panic!("esperava UnderpaidWithdrawal, veio {other:?}"),
    }

    let outcome = h
        .desk
        .request_transition(
            &h.technician,
            h.tenant_id,
            order.id,
            TransitionRequest {
                target_status: OrderStatus::PickedUp,
                reason: None,
                confirm_underpaid: true,
            },
        )
        .await
        .unwrap();
    assert_eq!(outcome.order.status, OrderStatus::PickedUp);

    let audit = h.desk.list_audit(&h.manager, h.tenant_id, order.id).await.unwrap();
    assert!(audit
        .iter()
        .any(|entry| entry.action == AuditAction::UnderpaidWithdrawalConfirmed));
}

#[tokio::test]
async fn items_are_editable_until_the_customer_commits() {
    let h = Harness::new().await;
    let order = h.analysed_order().await;
    let film = order.items()[1].id;

    let order = h
        .desk
        .update_item(
            &h.technician,
            h.tenant_id,
            order.id,
            film,
            UpdateItemRequest {
                price: Some(dec(70)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(order.total_value(), dec(170));

    let order = h.desk.remove_item(&h.technician, h.tenant_id, order.id, film).await.unwrap();
    assert_eq!(order.total_value(), dec(100));

    let err = h
        .desk
        .add_item(&h.technician, h.tenant_id, order.id, item("Bateria", -5, Severity::Recommended))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));
}

#[tokio::test]
async fn prices_are_whole_cents_within_limit() {
    let h = Harness::new().await;

    let mut sub_cent = item("Tela", 0, Severity::Critical);
    sub_cent.price = Decimal::new(100_004, 3);
    let err = h
        .desk
        .create_order(
            &h.technician,
            h.tenant_id,
            CreateOrderRequest {
                customer: CustomerPayload {
                    id: None,
                    name: "Maria Souza".into(),
                    phone: None,
                    email: None,
                },
                device: "iPhone 12".into(),
                items: vec![sub_cent.clone()],
                checklist: Vec::new(),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    let order = h.analysed_order().await;
    let err = h
        .desk
        .add_item(&h.technician, h.tenant_id, order.id, sub_cent)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    // Dois itens assim estourariam a soma; o primeiro já é recusado
    let mut huge = item("Placa", 0, Severity::Recommended);
    huge.price = Decimal::MAX;
    for _ in 0..2 {
        let err = h
            .desk
            .add_item(&h.technician, h.tenant_id, order.id, huge.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ValidationError(_)));
    }

    let err = h
        .desk
        .update_item(
            &h.technician,
            h.tenant_id,
            order.id,
            order.items()[0].id,
            UpdateItemRequest {
                price: Some(Decimal::new(9_999, 3)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ValidationError(_)));

    // Preço no teto é aceito, mas o total da OS também precisa caber na coluna
    let mut ceiling = item("Reparo de placa", 0, Severity::Recommended);
    ceiling.price = Decimal::new(999_999_999_999, 2);
    let err = h
        .desk
        .add_item(&h.technician, h.tenant_id, order.id, ceiling)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { ref field, .. } if field == "total"));

    let order = h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap();
    assert_eq!(order.total_value(), dec(150));
    assert_eq!(order.items().len(), 2);
}

#[tokio::test]
async fn checklist_and_notes_are_audited() {
    let h = Harness::new().await;
    let order = h.create_order(Vec::new()).await;

    let err = h
        .desk
        .set_checklist(
            &h.technician,
            h.tenant_id,
            order.id,
            vec![ChecklistEntry {
                label: " ".into(),
                checked: true,
                notes: None,
            }],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { .. }));

    let order = h
        .desk
        .set_checklist(
            &h.technician,
            h.tenant_id,
            order.id,
            vec![ChecklistEntry {
                label: "Liga normalmente".into(),
                checked: false,
                notes: Some("Reinicia sozinho".into()),
            }],
        )
        .await
        .unwrap();
    assert_eq!(order.checklist.len(), 1);

    let order = h
        .desk
        .set_technical_notes(&h.technician, h.tenant_id, order.id, Some("  Conector de carga oxidado ".into()))
        .await
        .unwrap();
    assert_eq!(order.technical_notes.as_deref(), Some("Conector de carga oxidado"));

    let audit = h.desk.list_audit(&h.manager, h.tenant_id, order.id).await.unwrap();
    let actions: Vec<AuditAction> = audit.iter().map(|entry| entry.action).collect();
    assert_eq!(
        actions,
        vec![AuditAction::NotesUpdated, AuditAction::ChecklistUpdated, AuditAction::OrderCreated]
    );
}

#[tokio::test]
async fn approved_cannot_be_forced_without_a_customer_answer() {
    let h = Harness::new().await;
    let order = h.analysed_order().await;

    let token = h
        .desk
        .create_approval_request(
            &h.technician,
            h.tenant_id,
            order.id,
            CreateApprovalRequest {
                item_ids: Vec::new(),
                description: "Orçamento".into(),
            },
        )
        .await
        .unwrap();
    let err = h
        .desk
        .request_transition(&h.technician, h.tenant_id, order.id, to(OrderStatus::Approved))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidField { .. }));

    let approval = h.desk.get_approval(&h.manager, h.tenant_id, token.approval_id).await.unwrap();
    assert!(approval.is_pending());
}

#[tokio::test]
async fn other_tenants_are_forbidden() {
    let h = Harness::new().await;
    let other = Harness::new().await;
    let order = h.create_order(Vec::new()).await;

    let err = h
        .desk
        .get_order(&other.manager, h.tenant_id, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    // Mesmo id, loja errada: não aparece
    let err = h
        .desk
        .get_order(&other.manager, other.tenant_id, order.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::ResourceNotFound(_)));
}
