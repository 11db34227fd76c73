use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres};
use uuid::Uuid;

use corral_core::models::{Membership, MembershipRole, NewInvite};
use corral_core::AppError;

use crate::db::transaction::TransactionGuard;
use crate::store_traits::{MembershipStore, RemovalOutcome, RoleChangeOutcome};

const MEMBERSHIP_COLUMNS: &str = "id, organization_id, user_id, role, status, invited_email, \
     invited_token, invited_expires_at, invited_by, created_at, updated_at";

/// Repository for memberships and the invitation lifecycle.
///
/// The claim is a single conditional UPDATE so that concurrent claims of one
/// token linearize to exactly one winner even across service instances; the
/// last-owner guards lock the owner rows in the same transaction as the
/// mutating write.
#[derive(Clone)]
pub struct MembershipRepository {
    pool: PgPool,
}

impl MembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Lock and count the accepted owner rows of an organization inside an
    /// open transaction.
    async fn lock_accepted_owners(
        tx: &mut TransactionGuard<'_>,
        organization_id: Uuid,
    ) -> Result<i64, AppError> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM memberships
            WHERE organization_id = $1 AND role = 'owner' AND status = 'accepted'
            FOR UPDATE
            "#,
        )
        .bind(organization_id)
        .fetch_all(&mut ***tx)
        .await?;

        Ok(rows.len() as i64)
    }
}

#[async_trait]
impl MembershipStore for MembershipRepository {
    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select", db.record_id = %membership_id))]
    async fn get(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {} FROM memberships WHERE organization_id = $1 AND id = $2",
            MEMBERSHIP_COLUMNS
        ))
        .bind(organization_id)
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn find_accepted_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {} FROM memberships WHERE organization_id = $1 AND user_id = $2 AND status = 'accepted'",
            MEMBERSHIP_COLUMNS
        ))
        .bind(organization_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn find_by_email(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, AppError> {
        // Matches both a pending invite addressed to the email and an
        // accepted membership whose principal registered with it.
        let membership = sqlx::query_as::<Postgres, Membership>(&format!(
            r#"
            SELECT {} FROM memberships m
            WHERE m.organization_id = $1
              AND (m.invited_email = $2
                   OR m.user_id IN (SELECT id FROM principals WHERE email = $2))
            LIMIT 1
            "#,
            MEMBERSHIP_COLUMNS
        ))
        .bind(organization_id)
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn list(&self, organization_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let memberships = sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {} FROM memberships WHERE organization_id = $1 ORDER BY created_at ASC",
            MEMBERSHIP_COLUMNS
        ))
        .bind(organization_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(memberships)
    }

    #[tracing::instrument(skip(self, invite), fields(db.table = "memberships", db.operation = "insert"))]
    async fn insert_invite(&self, invite: &NewInvite) -> Result<Membership, AppError> {
        let membership = sqlx::query_as::<Postgres, Membership>(
            r#"
            INSERT INTO memberships (
                organization_id, role, status, invited_email, invited_token,
                invited_expires_at, invited_by
            )
            VALUES ($1, $2, 'invited', $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(invite.organization_id)
        .bind(invite.role)
        .bind(&invite.email)
        .bind(&invite.token)
        .bind(invite.expires_at)
        .bind(invite.invited_by)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to insert invitation");
            AppError::Database(e)
        })?;

        tracing::info!(
            membership_id = %membership.id,
            organization_id = %invite.organization_id,
            role = %invite.role,
            "Invitation issued"
        );

        Ok(membership)
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "memberships", db.operation = "update"))]
    async fn claim_invite(
        &self,
        token: &str,
        email: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError> {
        // Single conditional write: status, token, email and expiry are all
        // part of the predicate, so two concurrent claims cannot both match.
        // The principal mirror row rides along in the same statement.
        let membership = sqlx::query_as::<Postgres, Membership>(
            r#"
            WITH claimed AS (
                UPDATE memberships
                SET status = 'accepted',
                    user_id = $1,
                    invited_email = NULL,
                    invited_token = NULL,
                    invited_expires_at = NULL,
                    updated_at = NOW()
                WHERE invited_token = $2
                  AND invited_email = $3
                  AND status = 'invited'
                  AND invited_expires_at > $4
                RETURNING *
            ), principal_upsert AS (
                INSERT INTO principals (id, email)
                SELECT $1, $3 FROM claimed
                ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            )
            SELECT * FROM claimed
            "#,
        )
        .bind(user_id)
        .bind(token)
        .bind(email)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(ref m) = membership {
            tracing::info!(
                membership_id = %m.id,
                organization_id = %m.organization_id,
                "Invitation claimed"
            );
        }

        Ok(membership)
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "memberships", db.operation = "select"))]
    async fn find_by_token(&self, token: &str) -> Result<Option<Membership>, AppError> {
        let membership = sqlx::query_as::<Postgres, Membership>(&format!(
            "SELECT {} FROM memberships WHERE invited_token = $1",
            MEMBERSHIP_COLUMNS
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    #[tracing::instrument(skip(self, token), fields(db.table = "memberships", db.operation = "update", db.record_id = %membership_id))]
    async fn rotate_invite_token(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError> {
        // Conditional on the invited status so a concurrent claim wins over
        // a resend.
        let membership = sqlx::query_as::<Postgres, Membership>(
            r#"
            UPDATE memberships
            SET invited_token = $1, invited_expires_at = $2, updated_at = NOW()
            WHERE organization_id = $3 AND id = $4 AND status = 'invited'
            RETURNING *
            "#,
        )
        .bind(token)
        .bind(expires_at)
        .bind(organization_id)
        .bind(membership_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(membership)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "delete", db.record_id = %membership_id))]
    async fn delete_invite(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<bool, AppError> {
        let rows_affected = sqlx::query(
            "DELETE FROM memberships WHERE organization_id = $1 AND id = $2 AND status = 'invited'",
        )
        .bind(organization_id)
        .bind(membership_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected > 0)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "select"))]
    async fn count_accepted_owners(&self, organization_id: Uuid) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM memberships
            WHERE organization_id = $1 AND role = 'owner' AND status = 'accepted'
            "#,
        )
        .bind(organization_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "update", db.record_id = %membership_id))]
    async fn change_role(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        new_role: MembershipRole,
        require_owner_remains: bool,
    ) -> Result<RoleChangeOutcome, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        if require_owner_remains {
            let owners = Self::lock_accepted_owners(&mut tx, organization_id).await?;
            if owners <= 1 {
                tx.rollback().await?;
                return Ok(RoleChangeOutcome::LastOwner);
            }
        }

        let updated = sqlx::query_as::<Postgres, Membership>(
            r#"
            UPDATE memberships
            SET role = $1, updated_at = NOW()
            WHERE organization_id = $2 AND id = $3 AND status = 'accepted'
            RETURNING *
            "#,
        )
        .bind(new_role)
        .bind(organization_id)
        .bind(membership_id)
        .fetch_optional(&mut **tx)
        .await?;

        match updated {
            Some(membership) => {
                tx.commit().await?;
                tracing::info!(
                    membership_id = %membership.id,
                    organization_id = %organization_id,
                    role = %membership.role,
                    "Membership role changed"
                );
                Ok(RoleChangeOutcome::Updated(membership))
            }
            None => {
                tx.rollback().await?;
                Ok(RoleChangeOutcome::NotFound)
            }
        }
    }

    #[tracing::instrument(skip(self), fields(db.table = "memberships", db.operation = "delete", db.record_id = %membership_id))]
    async fn remove_accepted(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        require_owner_remains: bool,
    ) -> Result<RemovalOutcome, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool).await?;

        if require_owner_remains {
            // The row under removal is itself an owner, so more than one
            // accepted owner must exist for one to remain afterwards.
            let owners = Self::lock_accepted_owners(&mut tx, organization_id).await?;
            if owners <= 1 {
                tx.rollback().await?;
                return Ok(RemovalOutcome::LastOwner);
            }
        }

        let rows_affected = sqlx::query(
            "DELETE FROM memberships WHERE organization_id = $1 AND id = $2 AND status = 'accepted'",
        )
        .bind(organization_id)
        .bind(membership_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();

        if rows_affected > 0 {
            tx.commit().await?;
            tracing::info!(
                membership_id = %membership_id,
                organization_id = %organization_id,
                "Membership removed"
            );
            Ok(RemovalOutcome::Removed)
        } else {
            tx.rollback().await?;
            Ok(RemovalOutcome::NotFound)
        }
    }
}
