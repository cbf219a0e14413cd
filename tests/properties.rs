// tests/properties.rs

mod common;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use rust_decimal::Decimal;
use uuid::Uuid;

use ordem_servico::{
    common::hashing::{digest_approval, ApprovalDigestInput},
    models::{
        approval::{ApprovalDecision, ClientMetadata, CreateApprovalRequest, ItemSelection, SubmitDecisionRequest},
        order::{ItemKind, NewItemRequest, OrderStatus, ServiceItem, ServiceOrder, Severity, UpdateItemRequest},
        payment::{PaymentMethod, PaymentSummary, ServicePayment},
    },
    services::state_machine::{can_transition, ensure_transition, valid_transitions},
};

fn cents(value: i64) -> Decimal {
    Decimal::new(value, 2)
}

fn payment(amount: i64) -> ServicePayment {
    ServicePayment {
        id: Uuid::new_v4(),
        tenant_id: Uuid::nil(),
        order_id: Uuid::nil(),
        amount: cents(amount),
        method: PaymentMethod::Cash,
        notes: None,
        paid_at: Utc::now(),
        recorded_by: "Caixa".into(),
    }
}

fn screen(price: i64) -> ServiceItem {
    ServiceItem {
        id: Uuid::from_u128(42),
        name: "Troca de tela".into(),
        price: cents(price),
        approved: true,
        severity: Severity::Critical,
        kind: ItemKind::Part,
    }
}

fn digest(items: &[ServiceItem], total: Decimal) -> String {
    digest_approval(&ApprovalDigestInput {
        order_id: Uuid::from_u128(1),
        items,
        total,
        signer_name: "Maria Souza",
        signature_id: Uuid::from_u128(2),
        responded_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
    })
    .unwrap()
}

fn signed_input(items: &[ServiceItem]) -> ApprovalDigestInput<'_> {
    ApprovalDigestInput {
        order_id: Uuid::from_u128(1),
        items,
        total: cents(10_000),
        signer_name: "Maria Souza",
        signature_id: Uuid::from_u128(2),
        responded_at: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
    }
}

#[derive(Debug, Clone)]
enum Edit {
    Add { price: i64, critical: bool },
    Reprice { pick: prop::sample::Index, price: i64 },
    Toggle { pick: prop::sample::Index, approved: bool },
    Remove { pick: prop::sample::Index },
}

fn edit() -> impl Strategy<Value = Edit> {
    prop_oneof![
        (0i64..1_000_000, any::<bool>()).prop_map(|(price, critical)| Edit::Add { price, critical }),
        (any::<prop::sample::Index>(), 0i64..1_000_000).prop_map(|(pick, price)| Edit::Reprice { pick, price }),
        (any::<prop::sample::Index>(), any::<bool>()).prop_map(|(pick, approved)| Edit::Toggle { pick, approved }),
        any::<prop::sample::Index>().prop_map(|pick| Edit::Remove { pick }),
    ]
}

// Recusas são esperadas (item crítico fora do orçamento, lista vazia); só o estado importa.
async fn apply_edit(h: &common::Harness, order: &ServiceOrder, edit: &Edit) {
    let picked = |pick: &prop::sample::Index| (!order.items().is_empty()).then(|| order.items()[pick.index(order.items().len())].id);

    match edit {
        Edit::Add { price, critical } => {
            let request = NewItemRequest {
                name: "Peça avulsa".into(),
                price: cents(*price),
                severity: if *critical { Severity::Critical } else { Severity::Recommended },
                kind: ItemKind::Part,
                approved: None,
            };
            let _ = h.desk.add_item(&h.technician, h.tenant_id, order.id, request).await;
        }
        Edit::Reprice { pick, price } => {
            if let Some(item_id) = picked(pick) {
                let request = UpdateItemRequest {
                    price: Some(cents(*price)),
                    ..Default::default()
                };
                let _ = h.desk.update_item(&h.technician, h.tenant_id, order.id, item_id, request).await;
            }
        }
        Edit::Toggle { pick, approved } => {
            if let Some(item_id) = picked(pick) {
                let request = UpdateItemRequest {
                    approved: Some(*approved),
                    ..Default::default()
                };
                let _ = h.desk.update_item(&h.technician, h.tenant_id, order.id, item_id, request).await;
            }
        }
        Edit::Remove { pick } => {
            if let Some(item_id) = picked(pick) {
                let _ = h.desk.remove_item(&h.technician, h.tenant_id, order.id, item_id).await;
            }
        }
    }
}

fn approved_sum(items: &[ServiceItem]) -> Decimal {
    items.iter().filter(|item| item.approved).map(|item| item.price).sum()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Edições antes e durante a aprovação, depois a seleção do cliente:
    /// o total da OS é sempre a soma dos itens aprovados e, no fim,
    /// coincide com o total assinado.
    #[test]
    fn order_total_is_the_sum_of_approved_items(
        before in prop::collection::vec(edit(), 0..6),
        during in prop::collection::vec(edit(), 0..6),
        declines in prop::collection::vec(any::<prop::sample::Index>(), 0..3),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
        runtime.block_on(async {
            let h = common::Harness::new().await;
            let mut order = h.analysed_order().await;

            for edit in &before {
                apply_edit(&h, &order, edit).await;
                order = h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap();
                prop_assert_eq!(order.total_value(), approved_sum(order.items()));
            }

            let request = CreateApprovalRequest {
                item_ids: Vec::new(),
                description: "Orçamento".into(),
            };
            let Ok(token) = h.desk.create_approval_request(&h.technician, h.tenant_id, order.id, request).await else {
                return Ok(());
            };

            for edit in &during {
                apply_edit(&h, &order, edit).await;
                order = h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap();
                prop_assert_eq!(order.total_value(), approved_sum(order.items()));
            }

            let snapshot = h.desk.get_approval(&h.manager, h.tenant_id, token.approval_id).await.unwrap().items_snapshot;
            let optional: Vec<&ServiceItem> = snapshot.iter().filter(|item| item.severity != Severity::Critical).collect();
            let selections: Vec<ItemSelection> = if optional.is_empty() {
                Vec::new()
            } else {
                declines
                    .iter()
                    .map(|pick| ItemSelection { item_id: optional[pick.index(optional.len())].id, approved: false })
                    .collect()
            };

            let submitted = h
                .desk
                .submit_approval_decision(
                    &token.token,
                    SubmitDecisionRequest {
                        decision: ApprovalDecision::PartialApprove,
                        selections,
                        signature: Some(common::signature("Maria Souza")),
                        reason: None,
                    },
                    ClientMetadata::default(),
                )
                .await;

            order = h.desk.get_order(&h.technician, h.tenant_id, order.id).await.unwrap();
            prop_assert_eq!(order.total_value(), approved_sum(order.items()));

            if let Ok(result) = submitted {
                prop_assert_eq!(order.status, OrderStatus::Approved);
                prop_assert_eq!(order.total_value(), result.approval.total_value);
                prop_assert_eq!(result.approval.total_value, approved_sum(&result.approval.items_snapshot));

                let summary = h.desk.payment_summary(&h.manager, h.tenant_id, order.id).await.unwrap();
                prop_assert_eq!(summary.approved_total, result.approval.total_value);
            }
            Ok(())
        })?;
    }
}

proptest! {
    /// Passeio aleatório pelo grafo: cada passo é uma aresta válida e os
    /// estados finais não têm saída.
    #[test]
    fn random_walks_stay_on_the_graph(choices in prop::collection::vec(any::<prop::sample::Index>(), 1..40)) {
        let mut status = OrderStatus::Draft;

        for choice in choices {
            let targets = valid_transitions(status);
            if targets.is_empty() {
                prop_assert!(status.is_terminal());
                for target in OrderStatus::ALL {
                    prop_assert!(ensure_transition(status, target).is_err());
                }
                break;
            }

            let next = targets[choice.index(targets.len())];
            prop_assert!(can_transition(status, next));
            prop_assert_ne!(next, OrderStatus::Draft);
            status = next;
        }
    }

    #[test]
    fn summary_balances_add_up(
        total in 0i64..1_000_000,
        amounts in prop::collection::vec(1i64..500_000, 0..6),
    ) {
        let payments: Vec<ServicePayment> = amounts.iter().copied().map(payment).collect();
        let summary = PaymentSummary::compute(Uuid::nil(), cents(total), &payments).unwrap();

        prop_assert!(summary.balance >= Decimal::ZERO);
        prop_assert!(summary.overpaid >= Decimal::ZERO);
        prop_assert!(summary.balance.is_zero() || summary.overpaid.is_zero());
        prop_assert_eq!(summary.balance - summary.overpaid, cents(total) - summary.paid_total);
        prop_assert_eq!(summary.ready_for_withdrawal, summary.balance.is_zero());
        prop_assert_eq!(summary.payments_count, amounts.len());
    }

    #[test]
    fn approval_digest_tracks_prices(price in 1i64..10_000_000, delta in 1i64..100_000) {
        let original = [screen(price)];
        let edited = [screen(price + delta)];

        let signed = digest(&original, cents(price));
        prop_assert_eq!(&signed, &digest(&original, cents(price)));
        prop_assert_ne!(&signed, &digest(&edited, cents(price)));
        prop_assert_ne!(&signed, &digest(&original, cents(price + delta)));
    }

    /// Qualquer campo assinado alterado muda o hash.
    #[test]
    fn approval_digest_covers_every_signed_field(
        other_id in 3u128..u128::MAX,
        later in 1i64..10_000_000,
        price in 1i64..10_000_000,
    ) {
        let mut film = screen(price);
        film.id = Uuid::from_u128(43);
        film.name = "Película".into();
        film.severity = Severity::Recommended;
        let items = [screen(price), film];
        let signed = digest_approval(&signed_input(&items)).unwrap();

        let mut input = signed_input(&items);
        input.signature_id = Uuid::from_u128(other_id);
        prop_assert_ne!(&signed, &digest_approval(&input).unwrap());

        let mut input = signed_input(&items);
        input.responded_at += Duration::seconds(later);
        prop_assert_ne!(&signed, &digest_approval(&input).unwrap());

        let mut input = signed_input(&items);
        input.order_id = Uuid::from_u128(other_id);
        prop_assert_ne!(&signed, &digest_approval(&input).unwrap());

        let mut declined = items.clone();
        declined[1].approved = false;
        prop_assert_ne!(&signed, &digest_approval(&signed_input(&declined)).unwrap());

        let mut downgraded = items.clone();
        downgraded[0].severity = Severity::Recommended;
        prop_assert_ne!(&signed, &digest_approval(&signed_input(&downgraded)).unwrap());
    }
}

#[test]
fn every_open_status_can_still_reach_an_end() {
    for start in OrderStatus::ALL {
        let mut seen = vec![start];
        let mut frontier = vec![start];
        while let Some(status) = frontier.pop() {
            for &next in valid_transitions(status) {
                if !seen.contains(&next) {
                    seen.push(next);
                    frontier.push(next);
                }
            }
        }
        assert!(seen.iter().any(|status| status.is_terminal()), "{start} não chega a um estado final");
    }
}
