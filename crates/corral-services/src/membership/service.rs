//! Membership lifecycle service.
//!
//! Invitations are memberships in the `invited` state carrying an email, a
//! single-use token and an expiry. Claiming is a single conditional write in
//! the store, so concurrent claims of one token produce exactly one winner.
//! Role changes and removals are guarded twice: by the pure authority rules
//! up front, and by the last-owner count inside the store transaction.

use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use corral_core::models::{Membership, MembershipRole, NewInvite, Organization, Principal};
use corral_core::{assignable_roles, can_act_on, AppError, Capability};
use corral_db::{MembershipStore, OrganizationStore, RemovalOutcome, RoleChangeOutcome};

use crate::access::AccessControl;
use crate::membership::token::generate_invite_token;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct InviteMemberRequest {
    #[validate(email(message = "invalid email address"))]
    pub email: String,
    pub role: MembershipRole,
}

/// A freshly issued (or re-issued) invitation. The token is returned exactly
/// once, for delivery to the invitee; it is not retrievable afterwards.
#[derive(Debug, Clone)]
pub struct IssuedInvite {
    pub membership: Membership,
    pub token: String,
}

pub struct MembershipService {
    access: Arc<AccessControl>,
    organizations: Arc<dyn OrganizationStore>,
    memberships: Arc<dyn MembershipStore>,
    invite_expiry_days: i64,
    invite_token_bytes: usize,
}

impl MembershipService {
    pub fn new(
        access: Arc<AccessControl>,
        organizations: Arc<dyn OrganizationStore>,
        memberships: Arc<dyn MembershipStore>,
        invite_expiry_days: i64,
        invite_token_bytes: usize,
    ) -> Self {
        Self {
            access,
            organizations,
            memberships,
            invite_expiry_days,
            invite_token_bytes,
        }
    }

    /// Create an organization with the caller as its creator and first
    /// accepted owner.
    #[tracing::instrument(skip(self, creator), fields(user.id = %creator.id))]
    pub async fn create_organization(
        &self,
        creator: &Principal,
        name: &str,
    ) -> Result<(Organization, Membership), AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::InvalidInput(
                "organization name cannot be empty".to_string(),
            ));
        }

        // Emails are stored lowercased everywhere, so the duplicate-invite
        // check and the claim predicate compare like with like whatever
        // casing the identity provider reports.
        let creator = Principal::new(creator.id, creator.email.trim().to_lowercase());
        let (organization, membership) =
            self.organizations.create_with_owner(name, &creator).await?;

        tracing::info!(
            org_id = %organization.id,
            user_id = %creator.id,
            "Organization created"
        );

        Ok((organization, membership))
    }

    /// Issue an invitation. The invited role must be assignable by the
    /// caller, and the email must not already hold a membership here.
    #[tracing::instrument(skip(self, principal, request), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn invite(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        request: &InviteMemberRequest,
    ) -> Result<IssuedInvite, AppError> {
        request
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        let actor = self
            .access
            .require(principal, organization_id, Capability::InviteMembers)
            .await?;

        if !assignable_roles(actor.role, actor.is_creator).contains(&request.role) {
            return Err(AppError::AuthorizationDenied(
                "you cannot assign a role with equal or higher authority than your own"
                    .to_string(),
            ));
        }

        let email = request.email.trim().to_lowercase();
        if let Some(existing) = self.memberships.find_by_email(organization_id, &email).await? {
            let message = if existing.is_accepted() {
                "this user is already a member of the organization"
            } else {
                "a pending invitation already exists for this email"
            };
            return Err(AppError::InvariantViolation(message.to_string()));
        }

        let token = generate_invite_token(self.invite_token_bytes);
        let expires_at = Utc::now() + Duration::days(self.invite_expiry_days);

        let membership = self
            .memberships
            .insert_invite(&NewInvite {
                organization_id,
                email,
                role: request.role,
                token: token.clone(),
                expires_at,
                invited_by: principal.id,
            })
            .await?;

        tracing::info!(
            org_id = %organization_id,
            membership_id = %membership.id,
            role = %request.role,
            "Invitation issued"
        );

        Ok(IssuedInvite { membership, token })
    }

    /// Claim a pending invitation with its token. The claimant's email must
    /// match the invited email, and the invitation must still be pending and
    /// unexpired. Exactly one of any set of concurrent claims succeeds.
    #[tracing::instrument(skip(self, principal, token), fields(user.id = %principal.id))]
    pub async fn claim(&self, principal: &Principal, token: &str) -> Result<Membership, AppError> {
        let now = Utc::now();
        let email = principal.email.trim().to_lowercase();

        if let Some(membership) = self
            .memberships
            .claim_invite(token, &email, principal.id, now)
            .await?
        {
            self.access
                .invalidate(principal.id, membership.organization_id);
            tracing::info!(
                org_id = %membership.organization_id,
                membership_id = %membership.id,
                "Invitation claimed"
            );
            return Ok(membership);
        }

        // The conditional write matched nothing. Look the token up once more
        // to report expiry distinctly; everything else stays one opaque
        // conflict so token probing learns nothing.
        match self.memberships.find_by_token(token).await? {
            Some(pending) if pending.is_invited() && pending.invite_expired_at(now) => Err(
                AppError::ClaimConflict("this invitation has expired".to_string()),
            ),
            _ => Err(AppError::ClaimConflict(
                "this invitation is invalid or was already claimed".to_string(),
            )),
        }
    }

    /// Re-issue a pending invitation with a fresh token and expiry. The old
    /// token stops working immediately.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn resend_invite(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<IssuedInvite, AppError> {
        self.access
            .require(principal, organization_id, Capability::InviteMembers)
            .await?;

        let target = self
            .memberships
            .get(organization_id, membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("membership not found".to_string()))?;

        if !target.is_invited() {
            return Err(AppError::InvariantViolation(
                "only pending invitations can be resent".to_string(),
            ));
        }

        let token = generate_invite_token(self.invite_token_bytes);
        let expires_at = Utc::now() + Duration::days(self.invite_expiry_days);

        let membership = self
            .memberships
            .rotate_invite_token(organization_id, membership_id, &token, expires_at)
            .await?
            .ok_or_else(|| {
                AppError::InvariantViolation("only pending invitations can be resent".to_string())
            })?;

        tracing::info!(
            org_id = %organization_id,
            membership_id = %membership_id,
            "Invitation re-issued"
        );

        Ok(IssuedInvite { membership, token })
    }

    /// Revoke a pending invitation. Its token stops working immediately.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn revoke_invite(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<(), AppError> {
        self.access
            .require(principal, organization_id, Capability::ManageMembers)
            .await?;

        let target = self
            .memberships
            .get(organization_id, membership_id)
            .await?
            .ok_or_else(|| AppError::NotFound("membership not found".to_string()))?;

        if !target.is_invited() {
            return Err(AppError::InvariantViolation(
                "only pending invitations can be revoked".to_string(),
            ));
        }

        let deleted = self
            .memberships
            .delete_invite(organization_id, membership_id)
            .await?;
        if !deleted {
            return Err(AppError::InvariantViolation(
                "only pending invitations can be revoked".to_string(),
            ));
        }

        tracing::info!(
            org_id = %organization_id,
            membership_id = %membership_id,
            "Invitation revoked"
        );

        Ok(())
    }

    /// Change the role of an accepted membership, subject to the authority
    /// rules and the last-owner guard.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn change_role(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        membership_id: Uuid,
        new_role: MembershipRole,
    ) -> Result<Membership, AppError> {
        let actor = self
            .access
            .require(principal, organization_id, Capability::ManageMembers)
            .await?;

        let target = self
            .memberships
            .get(organization_id, membership_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("membership not found in this organization".to_string())
            })?;

        if !target.is_accepted() {
            return Err(AppError::InvariantViolation(
                "role changes apply to accepted memberships only".to_string(),
            ));
        }

        let is_self = actor.membership_id == target.id;
        if is_self {
            return Err(AppError::AuthorizationDenied(
                "you cannot change your own membership".to_string(),
            ));
        }
        if !can_act_on(actor.role, actor.is_creator, is_self, target.role) {
            return Err(AppError::AuthorizationDenied(
                "the target membership has equal or higher authority than yours".to_string(),
            ));
        }
        if !assignable_roles(actor.role, actor.is_creator).contains(&new_role) {
            return Err(AppError::AuthorizationDenied(
                "you cannot assign a role with equal or higher authority than your own"
                    .to_string(),
            ));
        }

        let require_owner_remains =
            target.role == MembershipRole::Owner && new_role != MembershipRole::Owner;

        let outcome = self
            .memberships
            .change_role(organization_id, membership_id, new_role, require_owner_remains)
            .await?;

        match outcome {
            RoleChangeOutcome::Updated(updated) => {
                if let Some(user_id) = updated.user_id {
                    self.access.invalidate(user_id, organization_id);
                }
                tracing::info!(
                    org_id = %organization_id,
                    membership_id = %membership_id,
                    new_role = %new_role,
                    "Membership role changed"
                );
                Ok(updated)
            }
            RoleChangeOutcome::LastOwner => Err(AppError::InvariantViolation(
                "cannot demote the only owner of the organization".to_string(),
            )),
            RoleChangeOutcome::NotFound => Err(AppError::NotFound(
                "membership not found in this organization".to_string(),
            )),
        }
    }

    /// Remove an accepted membership, subject to the authority rules and the
    /// last-owner guard.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn remove_member(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<(), AppError> {
        let actor = self
            .access
            .require(principal, organization_id, Capability::ManageMembers)
            .await?;

        let target = self
            .memberships
            .get(organization_id, membership_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound("membership not found in this organization".to_string())
            })?;

        if !target.is_accepted() {
            return Err(AppError::InvariantViolation(
                "pending invitations are revoked, not removed".to_string(),
            ));
        }

        let is_self = actor.membership_id == target.id;
        if is_self {
            return Err(AppError::AuthorizationDenied(
                "you cannot remove your own membership".to_string(),
            ));
        }
        if !can_act_on(actor.role, actor.is_creator, is_self, target.role) {
            return Err(AppError::AuthorizationDenied(
                "the target membership has equal or higher authority than yours".to_string(),
            ));
        }

        let require_owner_remains = target.role == MembershipRole::Owner;

        let outcome = self
            .memberships
            .remove_accepted(organization_id, membership_id, require_owner_remains)
            .await?;

        match outcome {
            RemovalOutcome::Removed => {
                if let Some(user_id) = target.user_id {
                    self.access.invalidate(user_id, organization_id);
                }
                tracing::info!(
                    org_id = %organization_id,
                    membership_id = %membership_id,
                    "Membership removed"
                );
                Ok(())
            }
            RemovalOutcome::LastOwner => Err(AppError::InvariantViolation(
                "cannot remove the only owner of the organization".to_string(),
            )),
            RemovalOutcome::NotFound => Err(AppError::NotFound(
                "membership not found in this organization".to_string(),
            )),
        }
    }

    /// Leave the organization. The self-action rule does not apply here -
    /// leaving is the one way a principal removes itself - but the last-owner
    /// guard does.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn leave(
        &self,
        principal: &Principal,
        organization_id: Uuid,
    ) -> Result<(), AppError> {
        let membership = self
            .memberships
            .find_accepted_for_user(organization_id, principal.id)
            .await?
            .ok_or_else(|| {
                AppError::AuthorizationDenied(
                    "you are not a member of this organization".to_string(),
                )
            })?;

        let require_owner_remains = membership.role == MembershipRole::Owner;

        let outcome = self
            .memberships
            .remove_accepted(organization_id, membership.id, require_owner_remains)
            .await?;

        match outcome {
            RemovalOutcome::Removed => {
                self.access.invalidate(principal.id, organization_id);
                tracing::info!(
                    org_id = %organization_id,
                    membership_id = %membership.id,
                    "Member left organization"
                );
                Ok(())
            }
            RemovalOutcome::LastOwner => Err(AppError::InvariantViolation(
                "you cannot leave the organization as its only owner".to_string(),
            )),
            RemovalOutcome::NotFound => Err(AppError::NotFound(
                "membership not found in this organization".to_string(),
            )),
        }
    }

    /// List memberships. Callers without member management see accepted
    /// memberships only; pending invitations stay private to managers.
    pub async fn list_members(
        &self,
        principal: &Principal,
        organization_id: Uuid,
    ) -> Result<Vec<Membership>, AppError> {
        let actor = self.access.resolve(principal, organization_id).await?;

        let mut members = self.memberships.list(organization_id).await?;
        if !actor.capabilities.manage_members {
            members.retain(|m| m.is_accepted());
        }

        Ok(members)
    }
}
