// src/services/notification.rs

use async_trait::async_trait;

use crate::{common::error::AppError, models::order::CustomerRef};

#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub recipient: String,
    pub message: String,
}

impl Notification {
    /// Telefone, e-mail ou, na falta dos dois, o nome do cliente.
    pub fn to_customer(customer: &CustomerRef, message: impl Into<String>) -> Self {
        let recipient = customer
            .phone
            .clone()
            .or_else(|| customer.email.clone())
            .unwrap_or_else(|| customer.name.clone());

        Self {
            recipient,
            message: message.into(),
        }
    }
}

/// Canal de saída (WhatsApp, e-mail...). A entrega é problema do canal.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError>;
}

/// Só registra a mensagem no log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), AppError> {
        tracing::info!("📨 Notificação para {}: {}", notification.recipient, notification.message);
        Ok(())
    }
}
