//! Access control: resolves a principal's permissions inside an organization
//! and enforces capability requirements at every service entry point.
//!
//! Resolution goes through the permission cache first; a miss loads the
//! organization and the accepted membership, derives the capability set and
//! caches it. Mutating membership operations must call the invalidation hooks
//! so a demotion takes effect before the cache TTL elapses.

use std::sync::Arc;

use uuid::Uuid;

use corral_core::models::{MembershipRole, Principal};
use corral_core::permission_cache::CachedPermissions;
use corral_core::{capabilities_for, AppError, Capabilities, Capability, PermissionCache};
use corral_db::{MembershipStore, OrganizationStore};

/// A principal resolved against one organization: their accepted membership
/// plus the derived capability set.
#[derive(Debug, Clone)]
pub struct Actor {
    pub principal: Principal,
    pub organization_id: Uuid,
    pub membership_id: Uuid,
    pub role: MembershipRole,
    pub is_creator: bool,
    pub capabilities: Capabilities,
}

pub struct AccessControl {
    organizations: Arc<dyn OrganizationStore>,
    memberships: Arc<dyn MembershipStore>,
    cache: Arc<PermissionCache>,
}

impl AccessControl {
    pub fn new(
        organizations: Arc<dyn OrganizationStore>,
        memberships: Arc<dyn MembershipStore>,
        cache: Arc<PermissionCache>,
    ) -> Self {
        Self {
            organizations,
            memberships,
            cache,
        }
    }

    /// Resolve the principal's standing in the organization. Fails with
    /// `NotFound` when the organization does not exist and with
    /// `AuthorizationDenied` when the principal holds no accepted membership.
    #[tracing::instrument(skip(self, principal), fields(user.id = %principal.id, org.id = %organization_id))]
    pub async fn resolve(
        &self,
        principal: &Principal,
        organization_id: Uuid,
    ) -> Result<Actor, AppError> {
        if let Some(cached) = self.cache.get(principal.id, organization_id) {
            return Ok(Actor {
                principal: principal.clone(),
                organization_id,
                membership_id: cached.membership_id,
                role: cached.role,
                is_creator: cached.is_creator,
                capabilities: cached.capabilities,
            });
        }

        let organization = self
            .organizations
            .get(organization_id)
            .await?
            .ok_or_else(|| AppError::NotFound("organization not found".to_string()))?;

        let membership = self
            .memberships
            .find_accepted_for_user(organization_id, principal.id)
            .await?
            .ok_or_else(|| {
                AppError::AuthorizationDenied(
                    "you are not a member of this organization".to_string(),
                )
            })?;

        let is_creator = organization.is_creator(principal.id);
        let capabilities = capabilities_for(membership.role, is_creator);

        self.cache.insert(
            principal.id,
            organization_id,
            CachedPermissions {
                membership_id: membership.id,
                role: membership.role,
                is_creator,
                capabilities,
            },
        );

        Ok(Actor {
            principal: principal.clone(),
            organization_id,
            membership_id: membership.id,
            role: membership.role,
            is_creator,
            capabilities,
        })
    }

    /// Resolve and require one capability, denying with the capability's
    /// user-facing reason.
    pub async fn require(
        &self,
        principal: &Principal,
        organization_id: Uuid,
        capability: Capability,
    ) -> Result<Actor, AppError> {
        let actor = self.resolve(principal, organization_id).await?;

        if !actor.capabilities.allows(capability) {
            tracing::warn!(
                user_id = %principal.id,
                org_id = %organization_id,
                role = %actor.role,
                capability = ?capability,
                "Capability denied"
            );
            return Err(AppError::AuthorizationDenied(
                capability.denied_reason().to_string(),
            ));
        }

        Ok(actor)
    }

    pub fn invalidate(&self, user_id: Uuid, organization_id: Uuid) {
        self.cache.invalidate(user_id, organization_id);
    }

    pub fn invalidate_organization(&self, organization_id: Uuid) {
        self.cache.invalidate_organization(organization_id);
    }
}
