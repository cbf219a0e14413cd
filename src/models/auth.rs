// src/models/auth.rs

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    SuperAdmin, // Administração da plataforma (enxerga todos os tenants)
    Owner,
    Manager,
    Technician,
    Attendant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Owner => "OWNER",
            Role::Manager => "MANAGER",
            Role::Technician => "TECHNICIAN",
            Role::Attendant => "ATTENDANT",
        }
    }

    /// Cargos que herdam todas as permissões funcionais da loja.
    pub fn is_privileged(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Owner | Role::Manager)
    }
}

// Slugs das permissões funcionais
pub const PERM_ORDERS_READ: &str = "orders:read";
pub const PERM_ORDERS_WRITE: &str = "orders:write";
pub const PERM_APPROVALS_WRITE: &str = "approvals:write";
pub const PERM_EVIDENCE_WRITE: &str = "evidence:write";
pub const PERM_EVIDENCE_RETIRE: &str = "evidence:retire";
pub const PERM_PAYMENTS_WRITE: &str = "payments:write";

/// Principal autenticado, entregue pelo colaborador de autenticação em toda chamada.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Principal {
    pub id: Uuid,
    pub name: String,
    pub tenant_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
}

impl Principal {
    pub fn has_permission(&self, slug: &str) -> bool {
        self.role.is_privileged() || self.permissions.iter().any(|p| p == slug)
    }

    pub fn can_access_tenant(&self, tenant_id: Uuid) -> bool {
        self.role == Role::SuperAdmin || self.tenant_id == tenant_id
    }

    pub fn actor(&self) -> Actor {
        Actor {
            id: Some(self.id),
            name: self.name.clone(),
            role: self.role.as_str().to_string(),
        }
    }
}

/// Quem aparece no histórico e na auditoria.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Option<Uuid>,
    pub name: String,
    pub role: String,
}

impl Actor {
    pub fn customer(name: &str) -> Self {
        Self {
            id: None,
            name: name.to_string(),
            role: "CUSTOMER".to_string(),
        }
    }

    pub fn system() -> Self {
        Self {
            id: None,
            name: "Sistema".to_string(),
            role: "SYSTEM".to_string(),
        }
    }
}

// Estrutura de dados ("claims") dentro do JWT
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,  // Subject (ID do usuário)
    pub name: String,
    pub tenant_id: Uuid,
    pub role: Role,
    #[serde(default)]
    pub permissions: Vec<String>,
    pub exp: usize, // Expiration time (quando o token expira)
    pub iat: usize, // Issued At (quando o token foi criado)
}

impl From<Claims> for Principal {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.sub,
            name: claims.name,
            tenant_id: claims.tenant_id,
            role: claims.role,
            permissions: claims.permissions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(role: Role, permissions: &[&str]) -> Principal {
        Principal {
            id: Uuid::new_v4(),
            name: "Ana".into(),
            tenant_id: Uuid::new_v4(),
            role,
            permissions: permissions.iter().map(|p| p.to_string()).collect(),
        }
    }

    #[test]
    fn privileged_roles_hold_every_permission() {
        assert!(principal(Role::Manager, &[]).has_permission(PERM_EVIDENCE_RETIRE));
        assert!(!principal(Role::Technician, &[]).has_permission(PERM_EVIDENCE_RETIRE));
        assert!(principal(Role::Technician, &[PERM_EVIDENCE_RETIRE]).has_permission(PERM_EVIDENCE_RETIRE));
    }

    #[test]
    fn only_super_admin_crosses_tenants() {
        let owner = principal(Role::Owner, &[]);
        assert!(owner.can_access_tenant(owner.tenant_id));
        assert!(!owner.can_access_tenant(Uuid::new_v4()));
        assert!(principal(Role::SuperAdmin, &[]).can_access_tenant(Uuid::new_v4()));
    }
}
