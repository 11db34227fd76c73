//! Shared test fixtures: a fully wired service stack over the in-memory
//! stores, one organization and its creator.

use std::sync::Arc;

use uuid::Uuid;

use corral_core::constants::{INVITE_EXPIRY_DAYS, INVITE_TOKEN_BYTES, PERMISSION_CACHE_TTL_SECS};
use corral_core::models::{Membership, MembershipRole, Organization, Principal};
use corral_core::PermissionCache;
use corral_db::{LeadStore, MembershipStore, OrganizationStore, TemplateStore};
use corral_services::{
    AccessControl, ImportService, InviteMemberRequest, LeadService, MembershipService,
    SchemaService,
};

use crate::helpers::memory::InMemoryStore;

pub struct TestCtx {
    pub store: Arc<InMemoryStore>,
    pub access: Arc<AccessControl>,
    pub memberships: Arc<MembershipService>,
    pub schema: Arc<SchemaService>,
    pub leads: Arc<LeadService>,
    pub import: Arc<ImportService>,
    pub org: Organization,
    pub creator: Principal,
    pub creator_membership: Membership,
}

/// Wire the full service stack over in-memory stores and create one
/// organization owned by `creator@corral.test`.
pub async fn setup() -> TestCtx {
    let store = Arc::new(InMemoryStore::new());
    let organizations: Arc<dyn OrganizationStore> = store.clone();
    let membership_store: Arc<dyn MembershipStore> = store.clone();
    let templates: Arc<dyn TemplateStore> = store.clone();
    let lead_store: Arc<dyn LeadStore> = store.clone();

    let cache = Arc::new(PermissionCache::new(PERMISSION_CACHE_TTL_SECS));
    let access = Arc::new(AccessControl::new(
        organizations.clone(),
        membership_store.clone(),
        cache,
    ));

    let memberships = Arc::new(MembershipService::new(
        access.clone(),
        organizations,
        membership_store,
        INVITE_EXPIRY_DAYS,
        INVITE_TOKEN_BYTES,
    ));
    let schema = Arc::new(SchemaService::new(access.clone(), templates.clone()));
    let leads = Arc::new(LeadService::new(
        access.clone(),
        templates,
        lead_store.clone(),
    ));
    let import = Arc::new(ImportService::new(
        access.clone(),
        schema.clone(),
        lead_store,
    ));

    let creator = Principal::new(Uuid::new_v4(), "creator@corral.test");
    let (org, creator_membership) = memberships
        .create_organization(&creator, "Acme CRM")
        .await
        .expect("organization setup failed");

    TestCtx {
        store,
        access,
        memberships,
        schema,
        leads,
        import,
        org,
        creator,
        creator_membership,
    }
}

/// Invite `email` with `role` (issued by the creator) and claim it with a
/// fresh principal.
pub async fn add_member(
    ctx: &TestCtx,
    email: &str,
    role: MembershipRole,
) -> (Principal, Membership) {
    let invite = ctx
        .memberships
        .invite(
            &ctx.creator,
            ctx.org.id,
            &InviteMemberRequest {
                email: email.to_string(),
                role,
            },
        )
        .await
        .expect("invite failed");

    let principal = Principal::new(Uuid::new_v4(), email);
    let membership = ctx
        .memberships
        .claim(&principal, &invite.token)
        .await
        .expect("claim failed");

    (principal, membership)
}
