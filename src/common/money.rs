// src/common/money.rs

//! Regras de valores monetários: centavos exatos e o teto da coluna NUMERIC(12,2).

use rust_decimal::Decimal;
use validator::ValidationError;

use crate::common::error::AppError;

/// Maior valor que cabe em NUMERIC(12,2).
pub fn max_amount() -> Decimal {
    Decimal::new(999_999_999_999, 2)
}

fn problem(value: &Decimal) -> Option<&'static str> {
    if value.is_sign_negative() && !value.is_zero() {
        Some("valor não pode ser negativo")
    } else if value.normalize().scale() > 2 {
        Some("valor deve ter no máximo duas casas decimais")
    } else if *value > max_amount() {
        Some("valor acima do limite permitido")
    } else {
        None
    }
}

/// Validação de payload (`#[validate(custom(function = "validate_money"))]`).
pub fn validate_money(value: &Decimal) -> Result<(), ValidationError> {
    match problem(value) {
        Some(message) => {
            let mut err = ValidationError::new("money");
            err.message = Some(message.into());
            Err(err)
        }
        None => Ok(()),
    }
}

/// Mesma regra, para caminhos internos que não passam por payload.
pub fn check_money(field: &str, value: Decimal) -> Result<(), AppError> {
    match problem(&value) {
        Some(message) => Err(AppError::invalid(field, message)),
        None => Ok(()),
    }
}

/// Soma sem pânico de overflow.
pub fn checked_sum(field: &str, values: impl IntoIterator<Item = Decimal>) -> Result<Decimal, AppError> {
    values.into_iter().try_fold(Decimal::ZERO, |acc, value| {
        acc.checked_add(value)
            .ok_or_else(|| AppError::invalid(field, "soma excede o limite numérico"))
    })
}
