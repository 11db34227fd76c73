use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lead workflow status. Not part of the core state machine; preserved
/// verbatim through every operation that touches a lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "lead_status", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum LeadStatus {
    Draft,
    New,
    Contacted,
    Qualified,
    Won,
    Lost,
}

/// Lead entity. References exactly one template, which defines its shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Lead {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub template_id: Uuid,
    pub status: LeadStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One scalar value of a lead, referencing one field of the lead's template.
/// At most one value exists per (lead, field) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct LeadValue {
    pub id: Uuid,
    pub lead_id: Uuid,
    pub field_id: Uuid,
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Data for a new lead row.
#[derive(Debug, Clone)]
pub struct NewLead {
    pub organization_id: Uuid,
    pub template_id: Uuid,
    pub status: LeadStatus,
    pub created_by: Uuid,
}
