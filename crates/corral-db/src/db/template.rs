use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use corral_core::constants::UNIVERSAL_ORGANIZATION_ID;
use corral_core::models::{NewField, Template, TemplateField, TemplateWithFields};
use corral_core::AppError;

use crate::db::transaction::TransactionGuard;
use crate::store_traits::TemplateStore;

/// Repository for templates and their field definitions.
///
/// Visibility is organization-scoped plus the universal pseudo-organization.
/// Deletion guards (universal, default, in-use) live in the service layer;
/// this repository only guarantees the cascade order.
#[derive(Clone)]
pub struct TemplateRepository {
    pool: PgPool,
}

impl TemplateRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fields_for(&self, template_id: Uuid) -> Result<Vec<TemplateField>, AppError> {
        let fields = sqlx::query_as::<Postgres, TemplateField>(
            r#"
            SELECT id, template_id, label, key, field_type, required, sort_order
            FROM template_fields
            WHERE template_id = $1
            ORDER BY sort_order ASC
            "#,
        )
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(fields)
    }
}

#[async_trait]
impl TemplateStore for TemplateRepository {
    #[tracing::instrument(skip(self, fields), fields(db.table = "templates", db.operation = "insert"))]
    async fn create_with_fields(
        &self,
        organization_id: Uuid,
        name: &str,
        is_default: bool,
        fields: &[NewField],
    ) -> Result<TemplateWithFields, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let template = sqlx::query_as::<Postgres, Template>(
            r#"
            INSERT INTO templates (organization_id, name, is_default)
            VALUES ($1, $2, $3)
            RETURNING id, organization_id, name, is_default, created_at, updated_at
            "#,
        )
        .bind(organization_id)
        .bind(name)
        .bind(is_default)
        .fetch_one(&mut **tx)
        .await?;

        let mut inserted = Vec::with_capacity(fields.len());
        for field in fields {
            let row = sqlx::query_as::<Postgres, TemplateField>(
                r#"
                INSERT INTO template_fields (template_id, label, key, field_type, required, sort_order)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, template_id, label, key, field_type, required, sort_order
                "#,
            )
            .bind(template.id)
            .bind(&field.label)
            .bind(&field.key)
            .bind(field.field_type)
            .bind(field.required)
            .bind(field.sort_order)
            .fetch_one(&mut **tx)
            .await
            .map_err(|e| {
                // The transaction rolls back; no orphan template survives.
                tracing::error!(error = %e, template_id = %template.id, "Failed to insert template field");
                AppError::Database(e)
            })?;
            inserted.push(row);
        }

        tx.commit().await?;

        tracing::info!(
            template_id = %template.id,
            organization_id = %organization_id,
            field_count = inserted.len(),
            "Template created"
        );

        Ok(TemplateWithFields {
            template,
            fields: inserted,
        })
    }

    #[tracing::instrument(skip(self), fields(db.table = "templates", db.operation = "select", db.record_id = %template_id))]
    async fn get_visible(
        &self,
        organization_id: Uuid,
        template_id: Uuid,
    ) -> Result<Option<TemplateWithFields>, AppError> {
        let template = sqlx::query_as::<Postgres, Template>(
            r#"
            SELECT id, organization_id, name, is_default, created_at, updated_at
            FROM templates
            WHERE id = $1 AND organization_id IN ($2, $3)
            "#,
        )
        .bind(template_id)
        .bind(organization_id)
        .bind(UNIVERSAL_ORGANIZATION_ID)
        .fetch_optional(&self.pool)
        .await?;

        match template {
            Some(template) => {
                let fields = self.fields_for(template.id).await?;
                Ok(Some(TemplateWithFields { template, fields }))
            }
            None => Ok(None),
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "templates", db.operation = "select"))]
    async fn list_visible(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<TemplateWithFields>, AppError> {
        let templates = sqlx::query_as::<Postgres, Template>(
            r#"
            SELECT id, organization_id, name, is_default, created_at, updated_at
            FROM templates
            WHERE organization_id IN ($1, $2)
            ORDER BY name ASC
            "#,
        )
        .bind(organization_id)
        .bind(UNIVERSAL_ORGANIZATION_ID)
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(templates.len());
        for template in templates {
            let fields = self.fields_for(template.id).await?;
            result.push(TemplateWithFields { template, fields });
        }

        Ok(result)
    }

    #[tracing::instrument(skip(self), fields(db.table = "leads", db.operation = "select"))]
    async fn count_leads(&self, template_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE template_id = $1")
            .bind(template_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "templates", db.operation = "delete", db.record_id = %template_id))]
    async fn delete_cascade(&self, template_id: Uuid) -> Result<(), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        // Dependency order: values referencing the template's fields, then
        // the fields, then the template itself.
        sqlx::query(
            r#"
            DELETE FROM lead_values
            WHERE field_id IN (SELECT id FROM template_fields WHERE template_id = $1)
            "#,
        )
        .bind(template_id)
        .execute(&mut **tx)
        .await?;

        sqlx::query("DELETE FROM template_fields WHERE template_id = $1")
            .bind(template_id)
            .execute(&mut **tx)
            .await?;

        sqlx::query("DELETE FROM templates WHERE id = $1")
            .bind(template_id)
            .execute(&mut **tx)
            .await?;

        tx.commit().await?;

        tracing::info!(template_id = %template_id, "Template deleted");
        Ok(())
    }
}
