use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::UNIVERSAL_ORGANIZATION_ID;

/// Organization entity. `owner_id` is the creator principal and is never
/// reassigned; the creator holds superuser authority over every other member
/// regardless of their own membership role.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Organization {
    pub id: Uuid,
    pub name: String,
    pub owner_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// Whether the given principal created this organization.
    pub fn is_creator(&self, principal_id: Uuid) -> bool {
        self.owner_id == principal_id
    }
}

/// Whether an organization id refers to the reserved universal
/// pseudo-organization whose templates every organization can see.
pub fn is_universal_organization(organization_id: Uuid) -> bool {
    organization_id == UNIVERSAL_ORGANIZATION_ID
}
