// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Orders ---
        handlers::orders::create_order,
        handlers::orders::get_order,
        handlers::orders::list_audit,
        handlers::orders::transition_order,
        handlers::orders::add_item,
        handlers::orders::update_item,
        handlers::orders::remove_item,
        handlers::orders::set_checklist,
        handlers::orders::set_technical_notes,

        // --- Approvals ---
        handlers::approvals::create_approval_request,
        handlers::approvals::register_in_person_approval,
        handlers::approvals::register_in_person_rejection,
        handlers::approvals::register_physical_approval,
        handlers::approvals::get_approval,
        handlers::approvals::regenerate_receipt,

        // --- Evidence ---
        handlers::evidence::upload_evidence,
        handlers::evidence::get_evidence,
        handlers::evidence::retire_evidence,
        handlers::evidence::verify_evidence,

        // --- Payments ---
        handlers::payments::record_payment,
        handlers::payments::list_payments,
        handlers::payments::payment_summary,

        // --- Settings ---
        handlers::settings::get_settings,
        handlers::settings::update_settings,

        // --- Public ---
        handlers::public::get_approval_by_token,
        handlers::public::submit_approval_decision,
        handlers::public::verify_receipt,
    ),
    components(
        schemas(
            // --- Orders ---
            models::order::OrderStatus,
            models::order::Severity,
            models::order::ItemKind,
            models::order::ServiceItem,
            models::order::ChecklistEntry,
            models::order::CustomerRef,
            models::order::StatusHistoryEntry,
            models::order::ServiceOrder,
            models::order::OrderDetail,
            models::order::TransitionOutcome,
            models::order::NewItemRequest,
            models::order::UpdateItemRequest,
            models::order::CreateOrderRequest,
            models::order::CustomerPayload,
            models::order::TransitionRequest,
            models::order::ChecklistRequest,
            models::order::TechnicalNotesRequest,

            // --- Approvals ---
            models::approval::ApprovalStatus,
            models::approval::ApprovalChannel,
            models::approval::ApprovalDecision,
            models::approval::ServiceApproval,
            models::approval::SignatureArtifact,
            models::approval::DigitalSignature,
            models::approval::ItemSelection,
            models::approval::SignaturePayload,
            models::approval::CreateApprovalRequest,
            models::approval::SubmitDecisionRequest,
            models::approval::InPersonApprovalRequest,
            models::approval::InPersonRejectionRequest,
            models::approval::ApprovalToken,
            models::approval::ApprovalView,
            models::approval::ApprovalResult,
            models::approval::VerificationReport,
            handlers::approvals::PhysicalApprovalForm,

            // --- Evidence ---
            models::evidence::EvidenceStage,
            models::evidence::EvidenceLifecycle,
            models::evidence::Evidence,
            models::evidence::EvidenceGroup,
            models::evidence::EvidenceCheck,
            handlers::evidence::EvidenceUploadForm,

            // --- Audit ---
            models::audit::AuditAction,
            models::audit::AuditLogEntry,

            // --- Payments ---
            models::payment::PaymentMethod,
            models::payment::ServicePayment,
            models::payment::RecordPaymentRequest,
            models::payment::PaymentSummary,
            models::payment::PaymentOutcome,

            // --- Settings ---
            models::settings::ShopSettings,
            models::settings::UpdateSettingsRequest,
        )
    ),
    tags(
        (name = "Orders", description = "Ordens de Serviço e Máquina de Estados"),
        (name = "Approvals", description = "Aprovação do Orçamento (link, presencial e documento físico)"),
        (name = "Evidence", description = "Fotos e Documentos com Hash de Integridade"),
        (name = "Payments", description = "Pagamentos Parciais e Saldo"),
        (name = "Settings", description = "Configurações da Loja"),
        (name = "Public", description = "Link do Cliente e Verificação de Comprovantes")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
