// src/common/hashing.rs

//! Digests de conteúdo: bytes crus (evidências, comprovantes) e o registro
//! canônico de uma aprovação.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{common::error::AppError, models::order::ServiceItem};

// Separação de domínio: um hash de aprovação nunca colide com o hash de um arquivo.
const APPROVAL_DOMAIN: &[u8] = b"ordem-servico/approval/v1\n";

/// SHA-256 em hexadecimal minúsculo.
pub fn digest_bytes(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Representação canônica do que o cliente autorizou.
#[derive(Debug, Serialize)]
struct CanonicalApproval {
    order_id: String,
    items: Vec<CanonicalItem>,
    total: String,
    signer_name: String,
    signature_id: String,
    responded_at: String,
}

#[derive(Debug, Serialize)]
struct CanonicalItem {
    id: String,
    name: String,
    price: String,
    approved: bool,
    severity: &'static str,
}

// NUMERIC e JSON podem devolver escalas diferentes para o mesmo valor (100 vs 100.00).
// Sem arredondamento: valores já chegam em centavos exatos.
fn canonical_amount(value: Decimal) -> String {
    value.normalize().to_string()
}

// Postgres guarda microssegundos
fn canonical_instant(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub struct ApprovalDigestInput<'a> {
    pub order_id: Uuid,
    pub items: &'a [ServiceItem],
    pub total: Decimal,
    pub signer_name: &'a str,
    pub signature_id: Uuid,
    pub responded_at: DateTime<Utc>,
}

pub fn digest_approval(input: &ApprovalDigestInput<'_>) -> Result<String, AppError> {
    let canonical = CanonicalApproval {
        order_id: input.order_id.to_string(),
        items: input
            .items
            .iter()
            .map(|item| CanonicalItem {
                id: item.id.to_string(),
                name: item.name.clone(),
                price: canonical_amount(item.price),
                approved: item.approved,
                severity: item.severity.as_str(),
            })
            .collect(),
        total: canonical_amount(input.total),
        signer_name: input.signer_name.trim().to_string(),
        signature_id: input.signature_id.to_string(),
        responded_at: canonical_instant(input.responded_at),
    };

    let encoded = serde_json::to_vec(&canonical)
        .map_err(|e| AppError::IntegrityFailure(format!("falha ao canonicalizar aprovação: {e}")))?;

    let mut hasher = Sha256::new();
    hasher.update(APPROVAL_DOMAIN);
    hasher.update(&encoded);
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::order::{ItemKind, Severity};
    use chrono::TimeZone;

    fn items() -> Vec<ServiceItem> {
        vec![ServiceItem {
            id: Uuid::from_u128(7),
            name: "Tela".into(),
            price: Decimal::new(10000, 2),
            approved: true,
            severity: Severity::Critical,
            kind: ItemKind::Part,
        }]
    }

    fn input(items: &[ServiceItem]) -> ApprovalDigestInput<'_> {
        ApprovalDigestInput {
            order_id: Uuid::from_u128(1),
            items,
            total: Decimal::new(100, 0),
            signer_name: "Maria",
            signature_id: Uuid::from_u128(2),
            responded_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn digest_bytes_is_known_sha256() {
        assert_eq!(
            digest_bytes(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn approval_digest_ignores_decimal_scale() {
        let items = items();
        let mut other = items.clone();
        other[0].price = Decimal::new(100, 0);

        assert_eq!(
            digest_approval(&input(&items)).unwrap(),
            digest_approval(&input(&other)).unwrap()
        );
    }

    #[test]
    fn approval_digest_changes_with_signer() {
        let items = items();
        let base = digest_approval(&input(&items)).unwrap();

        let mut changed = input(&items);
        changed.signer_name = "Mario";
        assert_ne!(base, digest_approval(&changed).unwrap());
    }

    #[test]
    fn sub_cent_values_are_not_collapsed() {
        let mut low = items();
        low[0].price = Decimal::new(100_001, 3);
        let mut high = items();
        high[0].price = Decimal::new(100_004, 3);

        assert_ne!(
            digest_approval(&input(&low)).unwrap(),
            digest_approval(&input(&high)).unwrap()
        );
    }
}
