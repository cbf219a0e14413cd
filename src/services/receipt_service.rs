// src/services/receipt_service.rs

use std::{path::PathBuf, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use genpdf::{elements, style, Element};
use image::Luma;
use qrcode::QrCode;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    common::{
        clock::Clock,
        error::AppError,
        hashing::{digest_approval, ApprovalDigestInput},
    },
    db::{BlobStorage, Store},
    models::{
        approval::{ApprovalStatus, DigitalSignature, ServiceApproval, SignatureArtifact, VerificationReport},
        audit::{AuditAction, AuditLogEntry},
        auth::Actor,
        order::{ServiceItem, ServiceOrder},
        settings::ShopSettings,
    },
};

/// Hash de verificação: registro canônico do que foi autorizado + id da assinatura + instante da resposta.
pub fn generate_verification_hash(approval: &ServiceApproval, signature: &DigitalSignature) -> Result<String, AppError> {
    let responded_at = approval
        .responded_at
        .ok_or_else(|| AppError::IntegrityFailure(format!("aprovação {} sem data de resposta", approval.id)))?;

    digest_approval(&ApprovalDigestInput {
        order_id: approval.order_id,
        items: &approval.items_snapshot,
        total: approval.total_value,
        signer_name: &signature.signer_name,
        signature_id: signature.id,
        responded_at,
    })
}

/// Extrai os bytes de uma data URL `data:image/...;base64,...`.
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>, AppError> {
    let invalid = || AppError::invalid("signatureImage", "assinatura deve ser uma imagem em data URL base64");

    let rest = data_url.trim().strip_prefix("data:image/").ok_or_else(invalid)?;
    let (_, payload) = rest.split_once(";base64,").ok_or_else(invalid)?;

    let bytes = STANDARD.decode(payload.trim()).map_err(|_| invalid())?;
    if bytes.is_empty() {
        return Err(invalid());
    }
    Ok(bytes)
}

#[derive(Debug, Clone)]
pub enum ReceiptSignature {
    Drawn { image: Vec<u8> },
    PhysicalDocument { document_url: String, file_hash: String },
}

/// Tudo que o comprovante imprime. Montado a partir do registro persistido,
/// nunca recalcula o hash.
#[derive(Debug, Clone)]
pub struct ReceiptData {
    pub shop: ShopSettings,
    pub order_id: Uuid,
    pub order_number: i64,
    pub customer_name: String,
    pub device: String,
    pub description: String,
    pub items: Vec<ServiceItem>,
    pub total: Decimal,
    pub warranty_terms: Option<String>,
    pub signer_name: String,
    pub signer_document: Option<String>,
    pub signature: ReceiptSignature,
    pub responded_at: DateTime<Utc>,
    pub verification_hash: String,
    pub verify_url: String,
}

pub trait ReceiptRenderer: Send + Sync {
    fn render(&self, data: &ReceiptData) -> Result<Vec<u8>, AppError>;
}

fn pdf_error(e: impl std::fmt::Display) -> AppError {
    AppError::IntegrityFailure(format!("falha ao gerar comprovante: {e}"))
}

/// Comprovante em PDF (genpdf) com QR code apontando para a URL de verificação.
pub struct PdfReceiptRenderer {
    fonts_dir: PathBuf,
    font_family: String,
}

impl PdfReceiptRenderer {
    pub fn new(fonts_dir: impl Into<PathBuf>) -> Self {
        Self {
            fonts_dir: fonts_dir.into(),
            font_family: "Roboto".to_string(),
        }
    }
}

impl ReceiptRenderer for PdfReceiptRenderer {
    fn render(&self, data: &ReceiptData) -> Result<Vec<u8>, AppError> {
        let font_family = genpdf::fonts::from_files(&self.fonts_dir, &self.font_family, None)
            .map_err(|e| pdf_error(format!("fonte não encontrada em {}: {e}", self.fonts_dir.display())))?;

        let mut doc = genpdf::Document::new(font_family);
        doc.set_title(format!("Comprovante de aprovação - OS #{}", data.order_number));
        let mut decorator = genpdf::SimplePageDecorator::new();
        decorator.set_margins(10);
        doc.set_page_decorator(decorator);

        // --- CABEÇALHO ---
        let title_text = data
            .shop
            .company_name
            .clone()
            .unwrap_or_else(|| "ASSISTÊNCIA TÉCNICA".to_string());
        doc.push(elements::Paragraph::new(title_text).styled(style::Style::new().bold().with_font_size(18)));

        if let Some(doc_num) = &data.shop.document_number {
            doc.push(elements::Paragraph::new(format!("CNPJ/CPF: {doc_num}")).styled(style::Style::new().with_font_size(10)));
        }
        if let Some(phone) = &data.shop.phone {
            doc.push(elements::Paragraph::new(format!("Telefone: {phone}")).styled(style::Style::new().with_font_size(10)));
        }

        doc.push(elements::Break::new(1.5));

        doc.push(
            elements::Paragraph::new(format!("AUTORIZAÇÃO DE SERVIÇO - OS #{}", data.order_number))
                .styled(style::Style::new().bold().with_font_size(14)),
        );
        doc.push(elements::Paragraph::new(format!("Cliente: {}", data.customer_name)));
        doc.push(elements::Paragraph::new(format!("Aparelho: {}", data.device)));
        doc.push(elements::Paragraph::new(format!(
            "Respondido em: {}",
            data.responded_at.format("%d/%m/%Y %H:%M:%S UTC")
        )));

        doc.push(elements::Break::new(1));
        doc.push(elements::Paragraph::new("Diagnóstico").styled(style::Style::new().bold()));
        doc.push(elements::Paragraph::new(data.description.clone()));

        doc.push(elements::Break::new(1.5));

        // --- ITENS AUTORIZADOS ---
        // Pesos das colunas: Item (5), Tipo (2), Valor (2)
        let mut table = elements::TableLayout::new(vec![5, 2, 2]);
        table.set_cell_decorator(elements::FrameCellDecorator::new(true, true, false));

        let style_bold = style::Style::new().bold();
        table
            .row()
            .element(elements::Paragraph::new("Item").styled(style_bold))
            .element(elements::Paragraph::new("Classificação").styled(style_bold))
            .element(elements::Paragraph::new("Valor").styled(style_bold))
            .push()
            .map_err(pdf_error)?;

        for item in data.items.iter().filter(|item| item.approved) {
            let severity = match item.severity {
                crate::models::order::Severity::Critical => "Obrigatório",
                crate::models::order::Severity::Recommended => "Recomendado",
            };
            table
                .row()
                .element(elements::Paragraph::new(item.name.clone()))
                .element(elements::Paragraph::new(severity))
                .element(elements::Paragraph::new(format!("R$ {:.2}", item.price)))
                .push()
                .map_err(pdf_error)?;
        }

        doc.push(table);
        doc.push(elements::Break::new(1));

        let mut total_paragraph = elements::Paragraph::new(format!("TOTAL AUTORIZADO: R$ {:.2}", data.total));
        total_paragraph.set_alignment(genpdf::Alignment::Right);
        doc.push(total_paragraph.styled(style::Style::new().bold().with_font_size(12)));

        // --- GARANTIA ---
        if let Some(terms) = &data.warranty_terms {
            doc.push(elements::Break::new(1.5));
            doc.push(elements::Paragraph::new("Termos de garantia").styled(style::Style::new().bold()));
            doc.push(elements::Paragraph::new(terms.clone()).styled(style::Style::new().with_font_size(9)));
        }

        // --- ASSINATURA ---
        doc.push(elements::Break::new(1.5));
        match &data.signature {
            ReceiptSignature::Drawn { image } => {
                let decoded = image::load_from_memory(image).map_err(pdf_error)?;
                // genpdf não aceita canal alfa
                let rgb = image::DynamicImage::ImageRgb8(decoded.to_rgb8());
                let signature_image = elements::Image::from_dynamic_image(rgb)
                    .map_err(pdf_error)?
                    .with_scale(genpdf::Scale::new(0.4, 0.4));
                doc.push(signature_image);
            }
            ReceiptSignature::PhysicalDocument { document_url, file_hash } => {
                doc.push(
                    elements::Paragraph::new("Autorização assinada em documento físico")
                        .styled(style::Style::new().bold()),
                );
                doc.push(elements::Paragraph::new(format!("Documento: {document_url}")).styled(style::Style::new().with_font_size(8)));
                doc.push(elements::Paragraph::new(format!("SHA-256: {file_hash}")).styled(style::Style::new().with_font_size(8)));
            }
        }

        let signer = match &data.signer_document {
            Some(document) => format!("{} ({document})", data.signer_name),
            None => data.signer_name.clone(),
        };
        doc.push(elements::Paragraph::new(signer));

        // --- VERIFICAÇÃO (QR CODE) ---
        doc.push(elements::Break::new(1.5));
        doc.push(elements::Paragraph::new("VERIFIQUE A AUTENTICIDADE").styled(style::Style::new().bold().with_font_size(12)));

        let code = QrCode::new(data.verify_url.as_bytes()).map_err(pdf_error)?;
        let image_buffer = code.render::<Luma<u8>>().build();
        let dynamic_image = image::DynamicImage::ImageLuma8(image_buffer);
        let qr_image = elements::Image::from_dynamic_image(dynamic_image)
            .map_err(pdf_error)?
            .with_scale(genpdf::Scale::new(0.5, 0.5));
        doc.push(qr_image);

        doc.push(elements::Paragraph::new(data.verify_url.clone()).styled(style::Style::new().with_font_size(8)));
        doc.push(
            elements::Paragraph::new(format!("Hash: {}", data.verification_hash))
                .styled(style::Style::new().with_font_size(7)),
        );

        // --- RODAPÉ ---
        if let Some(addr) = &data.shop.address {
            doc.push(elements::Break::new(2));
            doc.push(elements::Paragraph::new(addr.clone()).styled(style::Style::new().italic().with_font_size(8)));
        }

        let mut buffer = Vec::new();
        doc.render(&mut buffer).map_err(pdf_error)?;

        Ok(buffer)
    }
}

#[derive(Clone)]
pub struct ReceiptService {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStorage>,
    renderer: Arc<dyn ReceiptRenderer>,
    clock: Arc<dyn Clock>,
    public_base_url: String,
}

impl ReceiptService {
    pub fn new(
        store: Arc<dyn Store>,
        blobs: Arc<dyn BlobStorage>,
        renderer: Arc<dyn ReceiptRenderer>,
        clock: Arc<dyn Clock>,
        public_base_url: &str,
    ) -> Self {
        Self {
            store,
            blobs,
            renderer,
            clock,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn verify_url(&self, verification_hash: &str) -> String {
        format!("{}/api/public/verify/{}", self.public_base_url, verification_hash)
    }

    pub fn build(
        &self,
        approval: &ServiceApproval,
        order: &ServiceOrder,
        shop: &ShopSettings,
        signature: &DigitalSignature,
    ) -> Result<ReceiptData, AppError> {
        let verification_hash = approval
            .verification_hash
            .clone()
            .ok_or_else(|| AppError::IntegrityFailure(format!("aprovação {} sem hash de verificação", approval.id)))?;
        let responded_at = approval
            .responded_at
            .ok_or_else(|| AppError::IntegrityFailure(format!("aprovação {} sem data de resposta", approval.id)))?;

        let receipt_signature = match &signature.artifact {
            SignatureArtifact::Drawn { image_data_url } => ReceiptSignature::Drawn {
                image: decode_data_url(image_data_url)?,
            },
            SignatureArtifact::PhysicalDocument {
                document_url, file_hash, ..
            } => ReceiptSignature::PhysicalDocument {
                document_url: document_url.clone(),
                file_hash: file_hash.clone(),
            },
        };

        Ok(ReceiptData {
            shop: shop.clone(),
            order_id: order.id,
            order_number: order.display_number,
            customer_name: order.customer.name.clone(),
            device: order.device.clone(),
            description: approval.description.clone(),
            items: approval.items_snapshot.clone(),
            total: approval.total_value,
            warranty_terms: approval.warranty_terms.clone(),
            signer_name: signature.signer_name.clone(),
            signer_document: signature.signer_document.clone(),
            signature: receipt_signature,
            responded_at,
            verify_url: self.verify_url(&verification_hash),
            verification_hash,
        })
    }

    /// Qualquer falha de renderização bloqueia a emissão.
    pub fn render(&self, data: &ReceiptData) -> Result<Vec<u8>, AppError> {
        self.renderer.render(data).map_err(|e| match e {
            AppError::IntegrityFailure(_) => e,
            other => AppError::IntegrityFailure(other.to_string()),
        })
    }

    pub async fn store_receipt(&self, approval: &ServiceApproval, pdf: &[u8]) -> Result<String, AppError> {
        let hash_prefix: String = approval
            .verification_hash
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(12)
            .collect();
        let key = format!("{}/receipts/{}-{}.pdf", approval.tenant_id, approval.id, hash_prefix);

        self.blobs.put(&key, pdf, "application/pdf").await
    }

    async fn load_signed(
        &self,
        tenant_id: Uuid,
        approval_id: Uuid,
    ) -> Result<(ServiceApproval, DigitalSignature), AppError> {
        let approval = self
            .store
            .get_approval(tenant_id, approval_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("Aprovação {approval_id}")))?;

        if approval.status != ApprovalStatus::Approved {
            return Err(AppError::invalid("approval", "só aprovações aceitas têm comprovante"));
        }

        let signature_id = approval
            .digital_signature_id
            .ok_or_else(|| AppError::IntegrityFailure(format!("aprovação {approval_id} sem assinatura")))?;
        let signature = self
            .store
            .get_signature(tenant_id, signature_id)
            .await?
            .ok_or_else(|| AppError::IntegrityFailure(format!("assinatura {signature_id} não encontrada")))?;

        Ok((approval, signature))
    }

    /// Re-renderiza o comprovante a partir do registro persistido. Recusa se o hash
    /// gravado não bater mais com o registro.
    pub async fn regenerate(&self, tenant_id: Uuid, approval_id: Uuid, actor: &Actor) -> Result<ServiceApproval, AppError> {
        let (mut approval, signature) = self.load_signed(tenant_id, approval_id).await?;

        let recomputed = generate_verification_hash(&approval, &signature)?;
        if approval.verification_hash.as_deref() != Some(recomputed.as_str()) {
            tracing::error!("🚨 Hash divergente na aprovação {}", approval_id);
            return Err(AppError::IntegrityFailure(format!(
                "registro da aprovação {approval_id} não confere com o hash gravado"
            )));
        }

        let order = self
            .store
            .get_order(tenant_id, approval.order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("OS {}", approval.order_id)))?;
        let shop = self.store.get_settings(tenant_id).await?;

        let data = self.build(&approval, &order, &shop, &signature)?;
        let pdf = self.render(&data)?;
        let url = self.store_receipt(&approval, &pdf).await?;

        let audit = AuditLogEntry::new(
            tenant_id,
            Some(approval.order_id),
            actor,
            AuditAction::ReceiptGenerated,
            format!("Comprovante regenerado: {url}"),
            self.clock.now(),
        );
        self.store.set_receipt_url(tenant_id, approval_id, &url, &audit).await?;

        approval.receipt_url = Some(url);
        Ok(approval)
    }

    /// Consulta pública pelo hash impresso no comprovante.
    pub async fn verify(&self, verification_hash: &str) -> Result<VerificationReport, AppError> {
        let approval = self
            .store
            .find_approval_by_hash(verification_hash)
            .await?
            .ok_or_else(|| AppError::not_found("Comprovante"))?;

        let order = self
            .store
            .get_order(approval.tenant_id, approval.order_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("OS {}", approval.order_id)))?;

        let signature = match approval.digital_signature_id {
            Some(signature_id) => self.store.get_signature(approval.tenant_id, signature_id).await?,
            None => None,
        };

        let matches = match &signature {
            Some(signature) => {
                approval.status == ApprovalStatus::Approved
                    && generate_verification_hash(&approval, signature)
                        .map(|recomputed| recomputed == verification_hash)
                        .unwrap_or(false)
            }
            None => false,
        };

        if !matches {
            tracing::warn!("⚠️ Verificação falhou para o hash {}", verification_hash);
        }

        Ok(VerificationReport {
            matches,
            verification_hash: verification_hash.to_string(),
            order_id: order.id,
            order_number: order.display_number,
            customer_name: order.customer.name,
            device: order.device,
            total_value: approval.total_value,
            signer_name: signature.map(|s| s.signer_name),
            responded_at: approval.responded_at,
            approval_status: approval.status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_decoding() {
        let url = format!("data:image/png;base64,{}", STANDARD.encode(b"\x89PNG fake"));
        assert_eq!(decode_data_url(&url).unwrap(), b"\x89PNG fake");

        assert!(decode_data_url("data:text/plain;base64,aGVsbG8=").is_err());
        assert!(decode_data_url("data:image/png;base64,@@@").is_err());
        assert!(decode_data_url("data:image/png;base64,").is_err());
    }
}
