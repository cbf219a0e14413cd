// src/services/evidence_policy.rs

use std::{collections::HashMap, str::FromStr};

use crate::{
    common::error::AppError,
    models::{evidence::EvidenceStage, order::OrderStatus},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PolicyMode {
    Off,
    /// Transição segue; as etapas ausentes voltam como aviso
    #[default]
    Advisory,
    Enforced,
}

impl FromStr for PolicyMode {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "off" => Ok(PolicyMode::Off),
            "advisory" => Ok(PolicyMode::Advisory),
            "enforced" => Ok(PolicyMode::Enforced),
            other => Err(format!("modo de política de evidências desconhecido: {other}")),
        }
    }
}

/// Tabela injetável "status de destino -> etapas de evidência esperadas".
#[derive(Debug, Clone)]
pub struct EvidencePolicy {
    mode: PolicyMode,
    rules: HashMap<OrderStatus, Vec<EvidenceStage>>,
}

impl Default for EvidencePolicy {
    fn default() -> Self {
        Self::new(PolicyMode::default())
    }
}

impl EvidencePolicy {
    /// Regras padrão: foto de entrada antes da análise, de finalização antes de
    /// concluir e de entrega antes da retirada.
    pub fn new(mode: PolicyMode) -> Self {
        let rules = HashMap::from([
            (OrderStatus::InAnalysis, vec![EvidenceStage::Entrada]),
            (OrderStatus::Done, vec![EvidenceStage::Finalizacao]),
            (OrderStatus::PickedUp, vec![EvidenceStage::Entrega]),
        ]);
        Self { mode, rules }
    }

    pub fn without_rules(mode: PolicyMode) -> Self {
        Self {
            mode,
            rules: HashMap::new(),
        }
    }

    pub fn with_rule(mut self, target: OrderStatus, stages: Vec<EvidenceStage>) -> Self {
        self.rules.insert(target, stages);
        self
    }

    pub fn mode(&self) -> PolicyMode {
        self.mode
    }

    pub fn required_for(&self, target: OrderStatus) -> &[EvidenceStage] {
        self.rules.get(&target).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Etapas exigidas para `target` que não aparecem em `present`.
    /// No modo `Enforced` a ausência vira `MissingEvidence`.
    pub fn evaluate(&self, target: OrderStatus, present: &[EvidenceStage]) -> Result<Vec<EvidenceStage>, AppError> {
        if self.mode == PolicyMode::Off {
            return Ok(Vec::new());
        }

        let missing: Vec<EvidenceStage> = self
            .required_for(target)
            .iter()
            .copied()
            .filter(|stage| !present.contains(stage))
            .collect();

        if missing.is_empty() {
            return Ok(missing);
        }

        match self.mode {
            PolicyMode::Enforced => Err(AppError::MissingEvidence { target, missing }),
            _ => {
                tracing::warn!("⚠️ Transição para {} sem evidências: {:?}", target, missing);
                Ok(missing)
            }
        }
    }
}
