//! Request types shared by feature routes

use ledgersync_common::TenantScope;
use serde::Deserialize;
use uuid::Uuid;

/// `company_id` and `division_id` query parameters.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TenantQuery {
    pub company_id: Uuid,
    pub division_id: Uuid,
}

impl TenantQuery {
    pub fn scope(&self) -> TenantScope {
        TenantScope::new(self.company_id, self.division_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_from_query() {
        let query: TenantQuery = serde_json::from_value(serde_json::json!({
            "company_id": Uuid::from_u128(1),
            "division_id": Uuid::from_u128(2),
        }))
        .unwrap();
        assert_eq!(query.scope(), TenantScope::new(Uuid::from_u128(1), Uuid::from_u128(2)));
    }
}
