// src/models/payment.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::{
        error::AppError,
        money::{checked_sum, validate_money},
    },
    models::order::OrderStatus,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "payment_method", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    Cash,
    Pix,
    CreditCard,
    DebitCard,
    BankTransfer,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServicePayment {
    pub id: Uuid,
    #[schema(ignore)]
    pub tenant_id: Uuid,
    pub order_id: Uuid,
    #[schema(example = "100.00")]
    pub amount: Decimal,
    pub method: PaymentMethod,
    pub notes: Option<String>,
    pub paid_at: DateTime<Utc>,
    pub recorded_by: String,
}

#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "validate_money"))]
    #[schema(example = "100.00")]
    pub amount: Decimal,

    pub method: PaymentMethod,

    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSummary {
    pub order_id: Uuid,
    pub approved_total: Decimal,
    pub paid_total: Decimal,
    /// Quanto falta pagar (nunca negativo)
    pub balance: Decimal,
    /// Valor pago acima do total aprovado, exibido para a equipe
    pub overpaid: Decimal,
    pub payments_count: usize,
    pub ready_for_withdrawal: bool,
}

impl PaymentSummary {
    pub fn compute(order_id: Uuid, approved_total: Decimal, payments: &[ServicePayment]) -> Result<Self, AppError> {
        let paid_total = checked_sum("amount", payments.iter().map(|p| p.amount))?;
        let difference = approved_total
            .checked_sub(paid_total)
            .ok_or_else(|| AppError::invalid("amount", "soma excede o limite numérico"))?;

        Ok(Self {
            order_id,
            approved_total,
            paid_total,
            balance: difference.max(Decimal::ZERO),
            overpaid: (-difference).max(Decimal::ZERO),
            payments_count: payments.len(),
            ready_for_withdrawal: paid_total >= approved_total,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutcome {
    pub payment: ServicePayment,
    pub summary: PaymentSummary,
    pub order_status: OrderStatus,
}
