//! Bulk import service.
//!
//! Import projects a header row plus data rows into a brand-new template and
//! one lead per usable row. Column handling is driven by a caller-supplied
//! mapping: excluded columns vanish, labels can be overridden, and field keys
//! are derived with `_1`, `_2`, ... suffixes on collisions.
//!
//! Row insertion is strict, the inverse of interactive lead creation: a lead
//! and its values commit or roll back together, a failed row never leaves a
//! partial lead behind, and the import carries on with the next row.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use corral_core::constants::IMPORT_ERROR_CAP;
use corral_core::models::{FieldType, LeadStatus, NewLead, Principal, TemplateWithFields};
use corral_core::validation::unique_field_keys;
use corral_core::{AppError, Capability};
use corral_db::LeadStore;

use crate::access::AccessControl;
use crate::schema::{CreateTemplateRequest, FieldSpec, SchemaService};

/// How one source column maps onto the new template.
#[derive(Debug, Clone, Deserialize)]
pub struct ColumnMapping {
    /// Header of the column in the source data.
    pub header: String,
    /// Optional label override; defaults to the header.
    #[serde(default)]
    pub label: Option<String>,
    pub field_type: FieldType,
    /// Excluded columns are dropped entirely.
    #[serde(default = "default_include")]
    pub include: bool,
}

fn default_include() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportRequest {
    pub template_name: String,
    /// One mapping per source column, in column order.
    pub mappings: Vec<ColumnMapping>,
    /// Data rows, cells in column order. Short rows read as blank cells.
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct ImportRowError {
    /// 1-based row number within the data rows.
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ImportReport {
    pub template: TemplateWithFields,
    pub leads_created: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    /// At most the first `error_cap` row errors.
    pub errors: Vec<ImportRowError>,
    pub errors_truncated: bool,
}

pub struct ImportService {
    access: Arc<AccessControl>,
    schema: Arc<SchemaService>,
    leads: Arc<dyn LeadStore>,
    error_cap: usize,
}

impl ImportService {
    pub fn new(
        access: Arc<AccessControl>,
        schema: Arc<SchemaService>,
        leads: Arc<dyn LeadStore>,
    ) -> Self {
        Self {
            access,
            schema,
            leads,
            error_cap: IMPORT_ERROR_CAP,
        }
    }

    /// Run an import: create the template from the included mappings, then
    /// insert one lead per non-blank row. Imported leads start in `draft`
    /// status so they can be reviewed before entering the pipeline.
    #[tracing::instrument(skip(self, principal, request), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn run(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: &ImportRequest,
    ) -> Result<ImportReport, AppError> {
        // Template creation checks ManageTemplates; row insertion needs
        // CreateLeads, checked here before any work happens.
        let actor = self
            .access
            .require(principal, organization_id, Capability::CreateLeads)
            .await?;

        let included: Vec<(usize, &ColumnMapping)> = request
            .mappings
            .iter()
            .enumerate()
            .filter(|(_, mapping)| mapping.include)
            .collect();

        if included.is_empty() {
            return Err(AppError::InvalidInput(
                "an import needs at least one included column".to_string(),
            ));
        }

        let labels: Vec<&str> = included
            .iter()
            .map(|(_, mapping)| mapping.label.as_deref().unwrap_or(&mapping.header).trim())
            .collect();
        let keys = unique_field_keys(labels.iter().copied());

        let fields: Vec<FieldSpec> = included
            .iter()
            .zip(keys)
            .map(|((_, mapping), key)| FieldSpec {
                label: mapping
                    .label
                    .as_deref()
                    .unwrap_or(&mapping.header)
                    .trim()
                    .to_string(),
                key: Some(key),
                field_type: mapping.field_type,
                required: false,
            })
            .collect();

        let template = self
            .schema
            .create_template(
                principal,
                organization_id,
                &CreateTemplateRequest {
                    name: request.template_name.clone(),
                    is_default: false,
                    fields,
                },
            )
            .await?;

        let mut leads_created = 0;
        let mut rows_skipped = 0;
        let mut rows_failed = 0;
        let mut errors = Vec::new();
        let mut errors_truncated = false;

        for (index, row) in request.rows.iter().enumerate() {
            let row_number = index + 1;

            // Blankness is judged on the included columns only; data living
            // solely in excluded columns must not produce a value-less lead.
            let blank = included.iter().all(|(column, _)| {
                row.get(*column)
                    .map(|cell| cell.trim().is_empty())
                    .unwrap_or(true)
            });
            if blank {
                rows_skipped += 1;
                continue;
            }

            let values: Vec<(Uuid, String)> = template
                .fields
                .iter()
                .zip(&included)
                .filter_map(|(field, (column, _))| {
                    let cell = row.get(*column).map(|c| c.trim()).unwrap_or("");
                    if cell.is_empty() {
                        None
                    } else {
                        Some((field.id, cell.to_string()))
                    }
                })
                .collect();

            let result = self
                .leads
                .insert_lead_with_values(
                    &NewLead {
                        organization_id,
                        template_id: template.template.id,
                        status: LeadStatus::Draft,
                        created_by: actor.principal.id,
                    },
                    &values,
                )
                .await;

            match result {
                Ok(_) => leads_created += 1,
                Err(error) => {
                    rows_failed += 1;
                    tracing::warn!(
                        org_id = %organization_id,
                        row = row_number,
                        %error,
                        "Import row failed; row rolled back"
                    );
                    if errors.len() < self.error_cap {
                        errors.push(ImportRowError {
                            row: row_number,
                            message: error.to_string(),
                        });
                    } else {
                        errors_truncated = true;
                    }
                }
            }
        }

        tracing::info!(
            org_id = %organization_id,
            template_id = %template.template.id,
            leads_created,
            rows_skipped,
            rows_failed,
            "Import finished"
        );

        Ok(ImportReport {
            template,
            leads_created,
            rows_skipped,
            rows_failed,
            errors,
            errors_truncated,
        })
    }
}
