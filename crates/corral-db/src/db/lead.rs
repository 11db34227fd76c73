use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use corral_core::models::{Lead, LeadStatus, LeadValue, NewLead};
use corral_core::AppError;

use crate::db::transaction::TransactionGuard;
use crate::store_traits::LeadStore;

const LEAD_COLUMNS: &str =
    "id, organization_id, template_id, status, created_by, created_at, updated_at";

const VALUE_COLUMNS: &str = "id, lead_id, field_id, value, created_at, updated_at";

/// Repository for leads and their per-field values.
#[derive(Clone)]
pub struct LeadRepository {
    pool: PgPool,
}

impl LeadRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeadStore for LeadRepository {
    #[tracing::instrument(skip(self, lead), fields(db.table = "leads", db.operation = "insert"))]
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let row = sqlx::query_as::<Postgres, Lead>(&format!(
            r#"
            INSERT INTO leads (organization_id, template_id, status, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(lead.organization_id)
        .bind(lead.template_id)
        .bind(lead.status)
        .bind(lead.created_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self, lead, values), fields(db.table = "leads", db.operation = "insert"))]
    async fn insert_lead_with_values(
        &self,
        lead: &NewLead,
        values: &[(Uuid, String)],
    ) -> Result<Lead, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let row = sqlx::query_as::<Postgres, Lead>(&format!(
            r#"
            INSERT INTO leads (organization_id, template_id, status, created_by)
            VALUES ($1, $2, $3, $4)
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(lead.organization_id)
        .bind(lead.template_id)
        .bind(lead.status)
        .bind(lead.created_by)
        .fetch_one(&mut **tx)
        .await?;

        for (field_id, value) in values {
            sqlx::query("INSERT INTO lead_values (lead_id, field_id, value) VALUES ($1, $2, $3)")
                .bind(row.id)
                .bind(field_id)
                .bind(value)
                .execute(&mut **tx)
                .await
                .map_err(|e| {
                    // Import rows are all-or-nothing: the lead rolls back
                    // with its values.
                    tracing::error!(error = %e, lead_id = %row.id, "Failed to insert lead value");
                    AppError::Database(e)
                })?;
        }

        tx.commit().await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "lead_values", db.operation = "insert", db.record_id = %lead_id))]
    async fn insert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError> {
        let row = sqlx::query_as::<Postgres, LeadValue>(&format!(
            r#"
            INSERT INTO lead_values (lead_id, field_id, value)
            VALUES ($1, $2, $3)
            RETURNING {}
            "#,
            VALUE_COLUMNS
        ))
        .bind(lead_id)
        .bind(field_id)
        .bind(value)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "lead_values", db.operation = "upsert", db.record_id = %lead_id))]
    async fn upsert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        let row = sqlx::query_as::<Postgres, LeadValue>(&format!(
            r#"
            INSERT INTO lead_values (lead_id, field_id, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (lead_id, field_id)
            DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            RETURNING {}
            "#,
            VALUE_COLUMNS
        ))
        .bind(lead_id)
        .bind(field_id)
        .bind(value)
        .fetch_one(&mut **tx)
        .await?;

        sqlx::query("UPDATE leads SET updated_at = NOW() WHERE id = $1")
            .bind(lead_id)
            .execute(&mut **tx)
            .await?;

        tx.commit().await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self, value), fields(db.table = "lead_values", db.operation = "insert", db.record_id = %lead_id))]
    async fn insert_value_if_absent(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<bool, AppError> {
        // Additive-only reconciliation path: existing values always win.
        let rows_affected = sqlx::query(
            r#"
            INSERT INTO lead_values (lead_id, field_id, value)
            VALUES ($1, $2, $3)
            ON CONFLICT (lead_id, field_id) DO NOTHING
            "#,
        )
        .bind(lead_id)
        .bind(field_id)
        .bind(value)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "leads", db.operation = "select", db.record_id = %lead_id))]
    async fn get(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<Postgres, Lead>(&format!(
            "SELECT {} FROM leads WHERE organization_id = $1 AND id = $2",
            LEAD_COLUMNS
        ))
        .bind(organization_id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    #[tracing::instrument(skip(self), fields(db.table = "leads", db.operation = "select"))]
    async fn list(&self, organization_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let leads = sqlx::query_as::<Postgres, Lead>(&format!(
            "SELECT {} FROM leads WHERE organization_id = $1 ORDER BY created_at DESC",
            LEAD_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(leads)
    }

    #[tracing::instrument(skip(self), fields(db.table = "lead_values", db.operation = "select", db.record_id = %lead_id))]
    async fn values_for(&self, lead_id: Uuid) -> Result<Vec<LeadValue>, AppError> {
        let values = sqlx::query_as::<Postgres, LeadValue>(
            r#"
            SELECT v.id, v.lead_id, v.field_id, v.value, v.created_at, v.updated_at
            FROM lead_values v
            JOIN template_fields f ON f.id = v.field_id
            WHERE v.lead_id = $1
            ORDER BY f.sort_order ASC
            "#,
        )
        .bind(lead_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(values)
    }

    #[tracing::instrument(skip(self), fields(db.table = "leads", db.operation = "update", db.record_id = %lead_id))]
    async fn update_status(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        let lead = sqlx::query_as::<Postgres, Lead>(&format!(
            r#"
            UPDATE leads
            SET status = $1, updated_at = NOW()
            WHERE organization_id = $2 AND id = $3
            RETURNING {}
            "#,
            LEAD_COLUMNS
        ))
        .bind(status)
        .bind(organization_id)
        .bind(lead_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lead)
    }

    #[tracing::instrument(skip(self), fields(db.table = "leads", db.operation = "delete", db.record_id = %lead_id))]
    async fn delete(&self, organization_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        // Tenant scope applies to the values too: only delete them when the
        // lead actually belongs to this organization.
        sqlx::query(
            r#"
            DELETE FROM lead_values
            WHERE lead_id IN (SELECT id FROM leads WHERE organization_id = $1 AND id = $2)
            "#,
        )
        .bind(organization_id)
        .bind(lead_id)
        .execute(&mut **tx)
        .await?;

        let rows_affected =
            sqlx::query("DELETE FROM leads WHERE organization_id = $1 AND id = $2")
                .bind(organization_id)
                .bind(lead_id)
                .execute(&mut **tx)
                .await?
                .rows_affected();

        tx.commit().await?;
        Ok(rows_affected > 0)
    }
}
