use async_trait::async_trait;
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use corral_core::models::{Membership, Organization, Principal};
use corral_core::AppError;

use crate::db::transaction::TransactionGuard;
use crate::store_traits::OrganizationStore;

/// Repository for organizations and their creator memberships.
#[derive(Clone)]
pub struct OrganizationRepository {
    pool: PgPool,
}

impl OrganizationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrganizationStore for OrganizationRepository {
    /// Create the organization and its creator's accepted owner membership in
    /// one transaction. The creator principal becomes the immutable owner.
    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "insert"))]
    async fn create_with_owner(
        &self,
        name: &str,
        creator: &Principal,
    ) -> Result<(Organization, Membership), AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        // Mirror the identity provider's principal for email joins.
        sqlx::query(
            r#"
            INSERT INTO principals (id, email)
            VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            "#,
        )
        .bind(creator.id)
        .bind(&creator.email)
        .execute(&mut **tx)
        .await?;

        let organization = sqlx::query_as::<Postgres, Organization>(
            r#"
            INSERT INTO organizations (name, owner_id)
            VALUES ($1, $2)
            RETURNING id, name, owner_id, created_at, updated_at
            "#,
        )
        .bind(name)
        .bind(creator.id)
        .fetch_one(&mut **tx)
        .await?;

        let membership = sqlx::query_as::<Postgres, Membership>(
            r#"
            INSERT INTO memberships (organization_id, user_id, role, status)
            VALUES ($1, $2, 'owner', 'accepted')
            RETURNING *
            "#,
        )
        .bind(organization.id)
        .bind(creator.id)
        .fetch_one(&mut **tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            organization_id = %organization.id,
            owner_id = %creator.id,
            "Organization created"
        );

        Ok((organization, membership))
    }

    #[tracing::instrument(skip(self), fields(db.table = "organizations", db.operation = "select"))]
    async fn get(&self, organization_id: Uuid) -> Result<Option<Organization>, AppError> {
        let organization = sqlx::query_as::<Postgres, Organization>(
            "SELECT id, name, owner_id, created_at, updated_at FROM organizations WHERE id = $1",
        )
        .bind(organization_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(organization)
    }
}
