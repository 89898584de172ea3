use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity of one analysis request. Owned by a `Consolidator` and the
/// dataset it produces; never shared between tenants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
    pub user_id: String,
    pub request_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl TenantContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            request_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }
}
