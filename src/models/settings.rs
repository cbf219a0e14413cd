// src/models/settings.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShopSettings {
    #[schema(ignore)] // O contexto (Header) já define a loja
    pub tenant_id: Uuid,

    #[schema(example = "Assistência Técnica Central")]
    pub company_name: Option<String>,

    #[schema(example = "12.345.678/0001-99")]
    pub document_number: Option<String>,

    #[schema(example = "Rua das Flores, 123 - Centro")]
    pub address: Option<String>,

    #[schema(example = "(11) 99999-8888")]
    pub phone: Option<String>,

    #[schema(example = "Garantia de 90 dias para peças e mão de obra.")]
    pub warranty_terms: Option<String>,

    pub updated_at: Option<DateTime<Utc>>,
}

impl ShopSettings {
    pub fn empty(tenant_id: Uuid) -> Self {
        Self {
            tenant_id,
            company_name: None,
            document_number: None,
            address: None,
            phone: None,
            warranty_terms: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub company_name: Option<String>,
    pub document_number: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub warranty_terms: Option<String>,
}
