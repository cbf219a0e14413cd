pub mod approval_service;
pub mod auth;
pub mod evidence_policy;
pub mod evidence_service;
pub mod notification;
pub mod order_desk;
pub mod payment_service;
pub mod receipt_service;
pub mod state_machine;
