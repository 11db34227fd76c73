//! Template management service.
//!
//! Field keys are derived from labels unless supplied explicitly; keys must
//! be unique within a template. Deletion is guarded in a fixed order:
//! visibility, universal, default, lead usage - each guard produces its own
//! error so callers can tell them apart.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use corral_core::models::{FieldType, NewField, Principal, TemplateWithFields};
use corral_core::validation::{derive_field_key, validate_field_key};
use corral_core::{AppError, Capability};
use corral_db::TemplateStore;

use crate::access::AccessControl;

/// One field definition in a template creation request. When `key` is absent
/// it is derived from the label.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldSpec {
    pub label: String,
    #[serde(default)]
    pub key: Option<String>,
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplateRequest {
    pub name: String,
    #[serde(default)]
    pub is_default: bool,
    pub fields: Vec<FieldSpec>,
}

pub struct SchemaService {
    access: Arc<AccessControl>,
    templates: Arc<dyn TemplateStore>,
}

impl SchemaService {
    pub fn new(access: Arc<AccessControl>, templates: Arc<dyn TemplateStore>) -> Self {
        Self { access, templates }
    }

    /// Create a template with its fields as one atomic unit. Fields keep
    /// their request order as sort order.
    #[tracing::instrument(skip(self, principal, request), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn create_template(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: &CreateTemplateRequest,
    ) -> Result<TemplateWithFields, AppError> {
        self.access
            .require(principal, organization_id, Capability::ManageTemplates)
            .await?;

        let name = request.name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput(
                "template name cannot be empty".to_string(),
            ));
        }
        if request.fields.is_empty() {
            return Err(AppError::InvalidInput(
                "a template needs at least one field".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        let mut fields = Vec::with_capacity(request.fields.len());
        for (index, spec) in request.fields.iter().enumerate() {
            let label = spec.label.trim();
            if label.is_empty() {
                return Err(AppError::InvalidInput(
                    "field label cannot be empty".to_string(),
                ));
            }

            let key = match &spec.key {
                Some(key) => key.trim().to_string(),
                None => derive_field_key(label),
            };
            validate_field_key(&key).map_err(|e| AppError::InvalidInput(e.to_string()))?;

            if !seen.insert(key.clone()) {
                return Err(AppError::InvariantViolation(format!(
                    "duplicate field key '{key}' in template"
                )));
            }

            fields.push(NewField {
                label: label.to_string(),
                key,
                field_type: spec.field_type,
                required: spec.required,
                sort_order: index as i32,
            });
        }

        let template = self
            .templates
            .create_with_fields(organization_id, name, request.is_default, &fields)
            .await?;

        tracing::info!(
            org_id = %organization_id,
            template_id = %template.template.id,
            field_count = template.fields.len(),
            "Template created"
        );

        Ok(template)
    }

    /// A template visible to the organization: its own or a universal one.
    pub async fn get_template(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        template_id: Uuid,
    ) -> Result<TemplateWithFields, AppError> {
        self.access
            .require(principal, organization_id, Capability::ViewLeads)
            .await?;

        self.templates
            .get_visible(organization_id, template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))
    }

    pub async fn list_templates(
        &self,
        principal: &Principal,
        organization_id: Uuid,
    ) -> Result<Vec<TemplateWithFields>, AppError> {
        self.access
            .require(principal, organization_id, Capability::ViewLeads)
            .await?;

        self.templates.list_visible(organization_id).await
    }

    /// Delete a template and everything hanging off it. A template that is
    /// universal, marked default, or referenced by any lead cannot be
    /// deleted. A template belonging to another organization reads as not
    /// found, never as forbidden.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn delete_template(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        template_id: Uuid,
    ) -> Result<(), AppError> {
        self.access
            .require(principal, organization_id, Capability::ManageTemplates)
            .await?;

        let existing = self
            .templates
            .get_visible(organization_id, template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))?;

        if existing.template.is_universal() {
            return Err(AppError::InvariantViolation(
                "universal templates cannot be deleted".to_string(),
            ));
        }
        if existing.template.is_default {
            return Err(AppError::InvariantViolation(
                "the default template cannot be deleted".to_string(),
            ));
        }

        let lead_count = self.templates.count_leads(template_id).await?;
        if lead_count > 0 {
            return Err(AppError::InvariantViolation(format!(
                "template is in use by {lead_count} lead(s)"
            )));
        }

        self.templates.delete_cascade(template_id).await?;

        tracing::info!(
            org_id = %organization_id,
            template_id = %template_id,
            "Template deleted"
        );

        Ok(())
    }
}
