// src/services/payment_service.rs

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{clock::Clock, error::AppError, money::check_money},
    db::Store,
    models::{
        audit::{AuditAction, AuditLogEntry},
        auth::Actor,
        order::ServiceOrder,
        payment::{PaymentSummary, RecordPaymentRequest, ServicePayment},
    },
    services::state_machine::ensure_open,
};

#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
}

impl PaymentService {
    pub fn new(store: Arc<dyn Store>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn summary(&self, order: &ServiceOrder) -> Result<PaymentSummary, AppError> {
        let payments = self.store.list_payments(order.tenant_id, order.id).await?;
        PaymentSummary::compute(order.id, order.total_value(), &payments)
    }

    pub async fn list(&self, order: &ServiceOrder) -> Result<Vec<ServicePayment>, AppError> {
        self.store.list_payments(order.tenant_id, order.id).await
    }

    /// Registra um pagamento (parcial ou não). Pagar a mais é permitido e aparece no resumo.
    pub async fn record(
        &self,
        order: &ServiceOrder,
        request: RecordPaymentRequest,
        actor: &Actor,
    ) -> Result<(ServicePayment, PaymentSummary), AppError> {
        if request.amount <= Decimal::ZERO {
            return Err(AppError::invalid("amount", "valor deve ser maior que zero"));
        }
        check_money("amount", request.amount)?;
        request.validate()?;
        ensure_open(order)?;

        let payment = ServicePayment {
            id: Uuid::new_v4(),
            tenant_id: order.tenant_id,
            order_id: order.id,
            amount: request.amount,
            method: request.method,
            notes: request.notes.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            paid_at: self.clock.now(),
            recorded_by: actor.name.clone(),
        };

        let audit = AuditLogEntry::new(
            order.tenant_id,
            Some(order.id),
            actor,
            AuditAction::PaymentRecorded,
            format!("Pagamento de R$ {:.2} ({:?})", payment.amount, payment.method),
            payment.paid_at,
        );
        self.store.insert_payment(&payment, &audit).await?;

        let summary = self.summary(order).await?;
        if summary.overpaid > Decimal::ZERO {
            tracing::warn!(
                "⚠️ OS #{} recebeu R$ {:.2} acima do total aprovado",
                order.display_number,
                summary.overpaid
            );
        }

        tracing::info!("💰 Pagamento {} registrado na OS #{}", payment.id, order.display_number);
        Ok((payment, summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::payment::PaymentMethod;
    use chrono::Utc;

    fn payment(amount: i64) -> ServicePayment {
        ServicePayment {
            id: Uuid::new_v4(),
            tenant_id: Uuid::nil(),
            order_id: Uuid::nil(),
            amount: Decimal::new(amount, 0),
            method: PaymentMethod::Pix,
            notes: None,
            paid_at: Utc::now(),
            recorded_by: "Caixa".into(),
        }
    }

    #[test]
    fn summary_tracks_balance_and_overpayment() {
        let partial = PaymentSummary::compute(Uuid::nil(), Decimal::new(150, 0), &[payment(100)]).unwrap();
        assert_eq!(partial.balance, Decimal::new(50, 0));
        assert!(!partial.ready_for_withdrawal);

        let over = PaymentSummary::compute(Uuid::nil(), Decimal::new(150, 0), &[payment(100), payment(60)]).unwrap();
        assert_eq!(over.balance, Decimal::ZERO);
        assert_eq!(over.overpaid, Decimal::new(10, 0));
        assert!(over.ready_for_withdrawal);
    }
}
