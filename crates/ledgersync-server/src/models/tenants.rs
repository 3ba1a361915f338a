//! Tenant roots

use ledgersync_common::{Table, TenantScope};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::{AuditRow, Record};

/// Company model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
}

/// Division model
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Division {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
}

impl Company {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl Division {
    pub fn new(id: Uuid, company_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            company_id,
            name: name.into(),
        }
    }
}

impl Record for Company {
    const TABLE: Table = Table::Companies;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        self.id == scope.company_id
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id)
    }
}

impl Record for Division {
    const TABLE: Table = Table::Divisions;

    fn id(&self) -> Uuid {
        self.id
    }

    fn in_scope(&self, scope: &TenantScope) -> bool {
        self.id == scope.division_id && self.company_id == scope.company_id
    }

    fn display_key(&self) -> String {
        self.name.clone()
    }

    fn audit(&self) -> AuditRow {
        AuditRow::new(self.id).reference("company_id", Table::Companies, self.company_id)
    }
}
