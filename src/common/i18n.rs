// src/common/i18n.rs

use std::collections::HashMap;

const DEFAULT_LANG: &str = "pt";

const PT: &[(&str, &str)] = &[
    ("INVALID_TRANSITION", "Esta mudança de status não é permitida a partir do status atual."),
    ("ALREADY_RESPONDED", "Alguém já respondeu a esta aprovação."),
    ("VALIDATION_ERROR", "Um ou mais campos são inválidos."),
    ("INTEGRITY_FAILURE", "Não foi possível gerar um comprovante verificável. Tente novamente."),
    ("NOT_FOUND", "Registro não encontrado."),
    ("FORBIDDEN", "Você não tem permissão para realizar esta ação."),
    ("INVALID_TOKEN", "Token de autenticação inválido ou ausente."),
    ("CONFLICT", "O registro foi alterado por outra operação. Recarregue e tente novamente."),
    ("UNDERPAID_WITHDRAWAL", "O pagamento está incompleto. Confirme a retirada mesmo assim."),
    ("MISSING_EVIDENCE", "Anexe as evidências obrigatórias antes de avançar."),
    ("INTERNAL_ERROR", "Ocorreu um erro inesperado."),
];

const EN: &[(&str, &str)] = &[
    ("INVALID_TRANSITION", "This status change is not allowed from the current status."),
    ("ALREADY_RESPONDED", "Someone already acted on this approval."),
    ("VALIDATION_ERROR", "One or more fields are invalid."),
    ("INTEGRITY_FAILURE", "A verifiable receipt could not be produced. Please retry."),
    ("NOT_FOUND", "Record not found."),
    ("FORBIDDEN", "You are not allowed to perform this action."),
    ("INVALID_TOKEN", "Authentication token is invalid or missing."),
    ("CONFLICT", "The record was changed by another operation. Reload and retry."),
    ("UNDERPAID_WITHDRAWAL", "Payment is incomplete. Confirm the pickup explicitly."),
    ("MISSING_EVIDENCE", "Attach the required evidence before moving on."),
    ("INTERNAL_ERROR", "An unexpected error occurred."),
];

/// Tabela de mensagens por idioma, indexada pelo código do erro.
#[derive(Debug, Clone)]
pub struct I18nStore {
    messages: HashMap<&'static str, HashMap<&'static str, &'static str>>,
}

impl Default for I18nStore {
    fn default() -> Self {
        let mut messages = HashMap::new();
        messages.insert("pt", PT.iter().copied().collect());
        messages.insert("en", EN.iter().copied().collect());
        Self { messages }
    }
}

impl I18nStore {
    pub fn translate(&self, lang: &str, code: &str) -> String {
        self.messages
            .get(lang)
            .or_else(|| self.messages.get(DEFAULT_LANG))
            .and_then(|table| table.get(code))
            .map(|message| message.to_string())
            .unwrap_or_else(|| code.to_string())
    }
}
