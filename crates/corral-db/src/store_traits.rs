//! Store trait abstractions for the service layer.
//!
//! These traits define the interface services need from persistence, allowing
//! for easy mocking and testing without database dependencies. The sqlx
//! repositories in `db/` are the production implementations; the service
//! crate's test helpers provide in-memory ones.
//!
//! Concurrency contract: `claim_invite` must be a single conditional write -
//! concurrent claims of one token linearize to exactly one winner.
//! `change_role` and `remove_accepted` re-check the last-owner count inside
//! the same transaction as the mutating write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use corral_core::models::{
    Lead, LeadStatus, LeadValue, Membership, MembershipRole, NewField, NewInvite, NewLead,
    Organization, Principal, TemplateWithFields,
};
use corral_core::AppError;

/// Outcome of a guarded role change.
#[derive(Debug, Clone)]
pub enum RoleChangeOutcome {
    Updated(Membership),
    /// The change would have left the organization without an accepted owner.
    LastOwner,
    NotFound,
}

/// Outcome of a guarded membership removal.
#[derive(Debug, Clone)]
pub enum RemovalOutcome {
    Removed,
    /// The removal would have left the organization without an accepted owner.
    LastOwner,
    NotFound,
}

#[async_trait]
pub trait OrganizationStore: Send + Sync {
    /// Create the organization and its creator's accepted owner membership
    /// as one atomic unit.
    async fn create_with_owner(
        &self,
        name: &str,
        creator: &Principal,
    ) -> Result<(Organization, Membership), AppError>;

    async fn get(&self, organization_id: Uuid) -> Result<Option<Organization>, AppError>;
}

#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn get(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, AppError>;

    async fn find_accepted_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, AppError>;

    /// Any membership (pending or accepted) attached to this email.
    async fn find_by_email(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, AppError>;

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Membership>, AppError>;

    async fn insert_invite(&self, invite: &NewInvite) -> Result<Membership, AppError>;

    /// Atomically claim a pending invitation: a single conditional update
    /// keyed on (token, email, status=invited, unexpired at `now`). Returns
    /// `None` when no row matched - already claimed, mismatched, or expired.
    async fn claim_invite(
        &self,
        token: &str,
        email: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError>;

    /// Diagnostic lookup after a failed claim, to distinguish an expired
    /// invitation from an invalid or already-claimed token.
    async fn find_by_token(&self, token: &str) -> Result<Option<Membership>, AppError>;

    /// Rotate the token and expiry of a still-pending invitation. Returns
    /// `None` when the membership is no longer in the invited state.
    async fn rotate_invite_token(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError>;

    /// Delete a pending invitation row. Returns false when no invited row
    /// matched.
    async fn delete_invite(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<bool, AppError>;

    async fn count_accepted_owners(&self, organization_id: Uuid) -> Result<i64, AppError>;

    /// Update the role of an accepted membership. With
    /// `require_owner_remains`, the update only commits if at least one other
    /// accepted owner exists, checked in the same transaction.
    async fn change_role(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        new_role: MembershipRole,
        require_owner_remains: bool,
    ) -> Result<RoleChangeOutcome, AppError>;

    /// Delete an accepted membership, with the same last-owner guard as
    /// `change_role`.
    async fn remove_accepted(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        require_owner_remains: bool,
    ) -> Result<RemovalOutcome, AppError>;
}

#[async_trait]
pub trait TemplateStore: Send + Sync {
    /// Create a template and its fields as one atomic unit; a field insert
    /// failure rolls back the template.
    async fn create_with_fields(
        &self,
        organization_id: Uuid,
        name: &str,
        is_default: bool,
        fields: &[NewField],
    ) -> Result<TemplateWithFields, AppError>;

    /// A template visible to the organization: its own or a universal one.
    async fn get_visible(
        &self,
        organization_id: Uuid,
        template_id: Uuid,
    ) -> Result<Option<TemplateWithFields>, AppError>;

    async fn list_visible(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<TemplateWithFields>, AppError>;

    async fn count_leads(&self, template_id: Uuid) -> Result<i64, AppError>;

    /// Delete dependent values, then fields, then the template, in that
    /// dependency order, atomically. Guards live in the service layer.
    async fn delete_cascade(&self, template_id: Uuid) -> Result<(), AppError>;
}

#[async_trait]
pub trait LeadStore: Send + Sync {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError>;

    /// Strict insert used by bulk import: the lead and all its values commit
    /// or roll back together.
    async fn insert_lead_with_values(
        &self,
        lead: &NewLead,
        values: &[(Uuid, String)],
    ) -> Result<Lead, AppError>;

    async fn insert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError>;

    /// Insert or update the value for (lead, field); always touches the
    /// lead's `updated_at`.
    async fn upsert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError>;

    /// Additive-only insert: a no-op when a value already exists for the
    /// pair. Returns whether a row was written.
    async fn insert_value_if_absent(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<bool, AppError>;

    async fn get(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError>;

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Lead>, AppError>;

    /// Values for a lead, ordered by the owning field's sort order.
    async fn values_for(&self, lead_id: Uuid) -> Result<Vec<LeadValue>, AppError>;

    async fn update_status(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError>;

    /// Delete a lead and its values.
    async fn delete(&self, organization_id: Uuid, lead_id: Uuid) -> Result<bool, AppError>;
}
