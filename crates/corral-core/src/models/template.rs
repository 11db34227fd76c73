use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::organization::is_universal_organization;

/// Scalar type of a template field. Values are stored as strings; the type
/// informs rendering and import mapping, not storage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(type_name = "field_type", rename_all = "lowercase"))]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Email,
    Phone,
    Date,
    Url,
    Boolean,
}

/// Template entity: the schema describing the ordered fields a lead of this
/// shape may carry. `organization_id` may be the reserved universal id, in
/// which case the template is visible to every organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Template {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Template {
    pub fn is_universal(&self) -> bool {
        is_universal_organization(self.organization_id)
    }
}

/// One field definition of a template. Keys are unique within a template;
/// fields are deleted only as part of template deletion.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct TemplateField {
    pub id: Uuid,
    pub template_id: Uuid,
    pub label: String,
    pub key: String,
    pub field_type: FieldType,
    pub required: bool,
    pub sort_order: i32,
}

/// A template together with its fields, ordered by `sort_order`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateWithFields {
    pub template: Template,
    pub fields: Vec<TemplateField>,
}

impl TemplateWithFields {
    pub fn field_by_key(&self, key: &str) -> Option<&TemplateField> {
        self.fields.iter().find(|f| f.key == key)
    }

    pub fn field_by_id(&self, field_id: Uuid) -> Option<&TemplateField> {
        self.fields.iter().find(|f| f.id == field_id)
    }
}

/// Data for a new field, key already derived and deduplicated by the caller.
#[derive(Debug, Clone)]
pub struct NewField {
    pub label: String,
    pub key: String,
    pub field_type: FieldType,
    pub required: bool,
    pub sort_order: i32,
}
