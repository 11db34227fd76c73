//! Lead record service.
//!
//! Creation is deliberately lenient: the lead row always survives, and a
//! value that fails to write is reported as skipped instead of failing the
//! whole operation. Reconciliation is additive-only - it fills gaps and
//! never overwrites an existing value. Bulk import takes the opposite,
//! strict stance; see the import module.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use corral_core::models::{
    Lead, LeadStatus, LeadValue, NewLead, Principal, TemplateWithFields,
};
use corral_core::{avatar_initial, display_name, AppError, Capability, LabeledValue};
use corral_db::{LeadStore, TemplateStore};

use crate::access::AccessControl;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateLeadRequest {
    pub template_id: Uuid,
    #[serde(default)]
    pub status: Option<LeadStatus>,
    /// Values keyed by field key. Keys that match no template field are
    /// ignored.
    #[serde(default)]
    pub values: HashMap<String, String>,
}

/// Result of a lenient lead creation: the lead plus the keys of any values
/// that could not be written.
#[derive(Debug, Clone)]
pub struct CreatedLead {
    pub lead: Lead,
    pub skipped_fields: Vec<String>,
}

/// A lead with its values and derived presentation fields.
#[derive(Debug, Clone)]
pub struct LeadDetail {
    pub lead: Lead,
    pub values: Vec<LeadValue>,
    pub display_name: String,
    pub avatar_initial: String,
}

/// Listing row: lead plus derived presentation fields.
#[derive(Debug, Clone)]
pub struct LeadSummary {
    pub lead: Lead,
    pub display_name: String,
    pub avatar_initial: String,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub values_added: usize,
}

pub struct LeadService {
    access: Arc<AccessControl>,
    templates: Arc<dyn TemplateStore>,
    leads: Arc<dyn LeadStore>,
}

impl LeadService {
    pub fn new(
        access: Arc<AccessControl>,
        templates: Arc<dyn TemplateStore>,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            access,
            templates,
            leads,
        }
    }

    /// Create a lead from a template and an optional set of initial values.
    /// Blank values and unknown keys are skipped silently; a value write
    /// failure is logged, reported in `skipped_fields`, and never takes the
    /// lead down with it.
    #[tracing::instrument(skip(self, principal, request), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn create_lead(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: &CreateLeadRequest,
    ) -> Result<CreatedLead, AppError> {
        let actor = self
            .access
            .require(principal, organization_id, Capability::CreateLeads)
            .await?;

        let template = self
            .templates
            .get_visible(organization_id, request.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))?;

        let lead = self
            .leads
            .insert_lead(&NewLead {
                organization_id,
                template_id: template.template.id,
                status: request.status.unwrap_or(LeadStatus::New),
                created_by: actor.principal.id,
            })
            .await?;

        let mut skipped_fields = Vec::new();
        for field in &template.fields {
            let Some(raw) = request.values.get(&field.key) else {
                continue;
            };
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }

            if let Err(error) = self.leads.insert_value(lead.id, field.id, value).await {
                tracing::error!(
                    lead_id = %lead.id,
                    field_key = %field.key,
                    %error,
                    "Failed to write lead value; lead kept"
                );
                skipped_fields.push(field.key.clone());
            }
        }

        tracing::info!(
            org_id = %organization_id,
            lead_id = %lead.id,
            skipped = skipped_fields.len(),
            "Lead created"
        );

        Ok(CreatedLead {
            lead,
            skipped_fields,
        })
    }

    pub async fn get_lead(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        lead_id: Uuid,
    ) -> Result<LeadDetail, AppError> {
        self.access
            .require(principal, organization_id, Capability::ViewLeads)
            .await?;

        let lead = self
            .leads
            .get(organization_id, lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound("lead not found".to_string()))?;

        let template = self
            .templates
            .get_visible(organization_id, lead.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))?;

        let values = self.leads.values_for(lead.id).await?;
        let labeled = labeled_values(&template, &values);
        let name = display_name(lead.id, &labeled);
        let initial = avatar_initial(&name);

        Ok(LeadDetail {
            lead,
            values,
            display_name: name,
            avatar_initial: initial,
        })
    }

    pub async fn list_leads(
        &self,
        principal: &Principal,
        organization_id: Uuid,
    ) -> Result<Vec<LeadSummary>, AppError> {
        self.access
            .require(principal, organization_id, Capability::ViewLeads)
            .await?;

        let leads = self.leads.list(organization_id).await?;

        // Leads of one listing usually share a handful of templates.
        let mut templates: HashMap<Uuid, TemplateWithFields> = HashMap::new();
        let mut summaries = Vec::with_capacity(leads.len());

        for lead in leads {
            if !templates.contains_key(&lead.template_id) {
                if let Some(template) = self
                    .templates
                    .get_visible(organization_id, lead.template_id)
                    .await?
                {
                    templates.insert(lead.template_id, template);
                }
            }

            let values = self.leads.values_for(lead.id).await?;
            let labeled = match templates.get(&lead.template_id) {
                Some(template) => labeled_values(template, &values),
                None => Vec::new(),
            };
            let name = display_name(lead.id, &labeled);
            let initial = avatar_initial(&name);

            summaries.push(LeadSummary {
                lead,
                display_name: name,
                avatar_initial: initial,
            });
        }

        Ok(summaries)
    }

    /// Set or replace the value of one field. The field must belong to the
    /// lead's template.
    #[tracing::instrument(skip(self, principal, value), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn upsert_field_value(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError> {
        self.access
            .require(principal, organization_id, Capability::EditLeads)
            .await?;

        let lead = self
            .leads
            .get(organization_id, lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound("lead not found".to_string()))?;

        let template = self
            .templates
            .get_visible(organization_id, lead.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))?;

        if template.field_by_id(field_id).is_none() {
            return Err(AppError::NotFound(
                "field does not belong to the lead's template".to_string(),
            ));
        }

        self.leads.upsert_value(lead.id, field_id, value).await
    }

    /// Fill in values the lead is missing for its template's fields, from the
    /// supplied map. Strictly additive: fields that already carry a value are
    /// left untouched, so running this twice with the same input is a no-op
    /// the second time.
    #[tracing::instrument(skip(self, principal, supplied), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn reconcile_missing_fields(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        lead_id: Uuid,
        supplied: &HashMap<Uuid, String>,
    ) -> Result<ReconcileOutcome, AppError> {
        self.access
            .require(principal, organization_id, Capability::EditLeads)
            .await?;

        let lead = self
            .leads
            .get(organization_id, lead_id)
            .await?
            .ok_or_else(|| AppError::NotFound("lead not found".to_string()))?;

        let template = self
            .templates
            .get_visible(organization_id, lead.template_id)
            .await?
            .ok_or_else(|| AppError::NotFound("template not found".to_string()))?;

        let existing: Vec<Uuid> = self
            .leads
            .values_for(lead.id)
            .await?
            .iter()
            .map(|v| v.field_id)
            .collect();

        let mut values_added = 0;
        for field in &template.fields {
            if existing.contains(&field.id) {
                continue;
            }
            let Some(raw) = supplied.get(&field.id) else {
                continue;
            };
            let value = raw.trim();
            if value.is_empty() {
                continue;
            }

            // The conditional insert re-checks absence, so a concurrent
            // writer cannot be overwritten.
            if self
                .leads
                .insert_value_if_absent(lead.id, field.id, value)
                .await?
            {
                values_added += 1;
            }
        }

        if values_added > 0 {
            tracing::info!(
                org_id = %organization_id,
                lead_id = %lead_id,
                values_added,
                "Reconciled missing lead values"
            );
        }

        Ok(ReconcileOutcome { values_added })
    }

    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn update_status(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Lead, AppError> {
        self.access
            .require(principal, organization_id, Capability::EditLeads)
            .await?;

        self.leads
            .update_status(organization_id, lead_id, status)
            .await?
            .ok_or_else(|| AppError::NotFound("lead not found".to_string()))
    }

    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn delete_lead(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        lead_id: Uuid,
    ) -> Result<(), AppError> {
        self.access
            .require(principal, organization_id, Capability::DeleteLeads)
            .await?;

        let deleted = self.leads.delete(organization_id, lead_id).await?;
        if !deleted {
            return Err(AppError::NotFound("lead not found".to_string()));
        }

        tracing::info!(org_id = %organization_id, lead_id = %lead_id, "Lead deleted");
        Ok(())
    }
}

/// Pair each value with its field's label, keeping the template's field
/// order. Values whose field is unknown to the template are dropped.
fn labeled_values(template: &TemplateWithFields, values: &[LeadValue]) -> Vec<LabeledValue> {
    template
        .fields
        .iter()
        .filter_map(|field| {
            values
                .iter()
                .find(|v| v.field_id == field.id)
                .map(|v| LabeledValue::new(field.label.clone(), v.value.clone()))
        })
        .collect()
}
