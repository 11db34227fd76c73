//! In-memory store implementations backing the service tests.
//!
//! Every trait method takes the single state lock for its whole body, so the
//! concurrency contracts of the real repositories (one claim winner, guarded
//! last-owner checks) hold here too.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use corral_core::constants::UNIVERSAL_ORGANIZATION_ID;
use corral_core::models::{
    Lead, LeadStatus, LeadValue, Membership, MembershipRole, MembershipStatus, NewField,
    NewInvite, NewLead, Organization, Principal, Template, TemplateField, TemplateWithFields,
};
use corral_core::AppError;
use corral_db::{
    LeadStore, MembershipStore, OrganizationStore, RemovalOutcome, RoleChangeOutcome,
    TemplateStore,
};

/// Sentinel value that makes any value write fail, for exercising the
/// lenient and strict error paths.
pub const FAILING_VALUE: &str = "__refuse_write__";

#[derive(Default)]
struct State {
    organizations: HashMap<Uuid, Organization>,
    memberships: HashMap<Uuid, Membership>,
    principal_emails: HashMap<Uuid, String>,
    templates: HashMap<Uuid, Template>,
    fields: HashMap<Uuid, TemplateField>,
    leads: HashMap<Uuid, Lead>,
    values: HashMap<Uuid, LeadValue>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: rewrite a membership's role directly, bypassing every
    /// service guard, to manufacture otherwise unreachable states.
    pub fn force_role(&self, membership_id: Uuid, role: MembershipRole) {
        let mut state = self.state.lock().unwrap();
        if let Some(membership) = state.memberships.get_mut(&membership_id) {
            membership.role = role;
        }
    }

    pub fn lead_count(&self) -> usize {
        self.state.lock().unwrap().leads.len()
    }

    pub fn value_count_for(&self, lead_id: Uuid) -> usize {
        self.state
            .lock()
            .unwrap()
            .values
            .values()
            .filter(|v| v.lead_id == lead_id)
            .count()
    }
}

fn new_membership(
    organization_id: Uuid,
    user_id: Option<Uuid>,
    role: MembershipRole,
    status: MembershipStatus,
) -> Membership {
    let now = Utc::now();
    Membership {
        id: Uuid::new_v4(),
        organization_id,
        user_id,
        role,
        status,
        invited_email: None,
        invited_token: None,
        invited_expires_at: None,
        invited_by: None,
        created_at: now,
        updated_at: now,
    }
}

fn accepted_owner_count(state: &State, organization_id: Uuid) -> usize {
    state
        .memberships
        .values()
        .filter(|m| {
            m.organization_id == organization_id
                && m.role == MembershipRole::Owner
                && m.status == MembershipStatus::Accepted
        })
        .count()
}

#[async_trait]
impl OrganizationStore for InMemoryStore {
    async fn create_with_owner(
        &self,
        name: &str,
        creator: &Principal,
    ) -> Result<(Organization, Membership), AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let organization = Organization {
            id: Uuid::new_v4(),
            name: name.to_string(),
            owner_id: creator.id,
            created_at: now,
            updated_at: now,
        };
        let membership = new_membership(
            organization.id,
            Some(creator.id),
            MembershipRole::Owner,
            MembershipStatus::Accepted,
        );

        state
            .organizations
            .insert(organization.id, organization.clone());
        state.memberships.insert(membership.id, membership.clone());
        // Mirrored verbatim, as the production repository does; callers are
        // responsible for normalizing before the write.
        state
            .principal_emails
            .insert(creator.id, creator.email.clone());

        Ok((organization, membership))
    }

    async fn get(&self, organization_id: Uuid) -> Result<Option<Organization>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state.organizations.get(&organization_id).cloned())
    }
}

#[async_trait]
impl MembershipStore for InMemoryStore {
    async fn get(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .get(&membership_id)
            .filter(|m| m.organization_id == organization_id)
            .cloned())
    }

    async fn find_accepted_for_user(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Membership>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .find(|m| {
                m.organization_id == organization_id
                    && m.user_id == Some(user_id)
                    && m.status == MembershipStatus::Accepted
            })
            .cloned())
    }

    async fn find_by_email(
        &self,
        organization_id: Uuid,
        email: &str,
    ) -> Result<Option<Membership>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .find(|m| {
                m.organization_id == organization_id
                    && (m.invited_email.as_deref() == Some(email)
                        || m.user_id
                            .and_then(|id| state.principal_emails.get(&id))
                            .map(|e| e == email)
                            .unwrap_or(false))
            })
            .cloned())
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Membership>, AppError> {
        let state = self.state.lock().unwrap();
        let mut members: Vec<Membership> = state
            .memberships
            .values()
            .filter(|m| m.organization_id == organization_id)
            .cloned()
            .collect();
        members.sort_by_key(|m| m.created_at);
        Ok(members)
    }

    async fn insert_invite(&self, invite: &NewInvite) -> Result<Membership, AppError> {
        let mut state = self.state.lock().unwrap();
        let membership = Membership {
            invited_email: Some(invite.email.clone()),
            invited_token: Some(invite.token.clone()),
            invited_expires_at: Some(invite.expires_at),
            invited_by: Some(invite.invited_by),
            ..new_membership(
                invite.organization_id,
                None,
                invite.role,
                MembershipStatus::Invited,
            )
        };
        state.memberships.insert(membership.id, membership.clone());
        Ok(membership)
    }

    async fn claim_invite(
        &self,
        token: &str,
        email: &str,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError> {
        let mut state = self.state.lock().unwrap();

        let claimed_id = state
            .memberships
            .values()
            .find(|m| {
                m.status == MembershipStatus::Invited
                    && m.invited_token.as_deref() == Some(token)
                    && m.invited_email.as_deref() == Some(email)
                    && m.invited_expires_at.map(|e| e > now).unwrap_or(false)
            })
            .map(|m| m.id);

        let Some(id) = claimed_id else {
            return Ok(None);
        };

        state
            .principal_emails
            .insert(user_id, email.to_string());
        let membership = state.memberships.get_mut(&id).unwrap();
        membership.status = MembershipStatus::Accepted;
        membership.user_id = Some(user_id);
        membership.invited_email = None;
        membership.invited_token = None;
        membership.invited_expires_at = None;
        membership.updated_at = now;
        Ok(Some(membership.clone()))
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<Membership>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .memberships
            .values()
            .find(|m| m.invited_token.as_deref() == Some(token))
            .cloned())
    }

    async fn rotate_invite_token(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Option<Membership>, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.memberships.get_mut(&membership_id) {
            Some(m)
                if m.organization_id == organization_id
                    && m.status == MembershipStatus::Invited =>
            {
                m.invited_token = Some(token.to_string());
                m.invited_expires_at = Some(expires_at);
                m.updated_at = Utc::now();
                Ok(Some(m.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_invite(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
    ) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let matches = state
            .memberships
            .get(&membership_id)
            .map(|m| {
                m.organization_id == organization_id && m.status == MembershipStatus::Invited
            })
            .unwrap_or(false);
        if matches {
            state.memberships.remove(&membership_id);
        }
        Ok(matches)
    }

    async fn count_accepted_owners(&self, organization_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.lock().unwrap();
        Ok(accepted_owner_count(&state, organization_id) as i64)
    }

    async fn change_role(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        new_role: MembershipRole,
        require_owner_remains: bool,
    ) -> Result<RoleChangeOutcome, AppError> {
        let mut state = self.state.lock().unwrap();

        if require_owner_remains && accepted_owner_count(&state, organization_id) <= 1 {
            return Ok(RoleChangeOutcome::LastOwner);
        }

        match state.memberships.get_mut(&membership_id) {
            Some(m)
                if m.organization_id == organization_id
                    && m.status == MembershipStatus::Accepted =>
            {
                m.role = new_role;
                m.updated_at = Utc::now();
                Ok(RoleChangeOutcome::Updated(m.clone()))
            }
            _ => Ok(RoleChangeOutcome::NotFound),
        }
    }

    async fn remove_accepted(
        &self,
        organization_id: Uuid,
        membership_id: Uuid,
        require_owner_remains: bool,
    ) -> Result<RemovalOutcome, AppError> {
        let mut state = self.state.lock().unwrap();

        if require_owner_remains && accepted_owner_count(&state, organization_id) <= 1 {
            return Ok(RemovalOutcome::LastOwner);
        }

        let matches = state
            .memberships
            .get(&membership_id)
            .map(|m| {
                m.organization_id == organization_id && m.status == MembershipStatus::Accepted
            })
            .unwrap_or(false);
        if matches {
            state.memberships.remove(&membership_id);
            Ok(RemovalOutcome::Removed)
        } else {
            Ok(RemovalOutcome::NotFound)
        }
    }
}

#[async_trait]
impl TemplateStore for InMemoryStore {
    async fn create_with_fields(
        &self,
        organization_id: Uuid,
        name: &str,
        is_default: bool,
        fields: &[NewField],
    ) -> Result<TemplateWithFields, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let template = Template {
            id: Uuid::new_v4(),
            organization_id,
            name: name.to_string(),
            is_default,
            created_at: now,
            updated_at: now,
        };

        let rows: Vec<TemplateField> = fields
            .iter()
            .map(|f| TemplateField {
                id: Uuid::new_v4(),
                template_id: template.id,
                label: f.label.clone(),
                key: f.key.clone(),
                field_type: f.field_type,
                required: f.required,
                sort_order: f.sort_order,
            })
            .collect();

        state.templates.insert(template.id, template.clone());
        for row in &rows {
            state.fields.insert(row.id, row.clone());
        }

        Ok(TemplateWithFields {
            template,
            fields: rows,
        })
    }

    async fn get_visible(
        &self,
        organization_id: Uuid,
        template_id: Uuid,
    ) -> Result<Option<TemplateWithFields>, AppError> {
        let state = self.state.lock().unwrap();
        let Some(template) = state.templates.get(&template_id) else {
            return Ok(None);
        };
        if template.organization_id != organization_id
            && template.organization_id != UNIVERSAL_ORGANIZATION_ID
        {
            return Ok(None);
        }

        let mut fields: Vec<TemplateField> = state
            .fields
            .values()
            .filter(|f| f.template_id == template_id)
            .cloned()
            .collect();
        fields.sort_by_key(|f| f.sort_order);

        Ok(Some(TemplateWithFields {
            template: template.clone(),
            fields,
        }))
    }

    async fn list_visible(
        &self,
        organization_id: Uuid,
    ) -> Result<Vec<TemplateWithFields>, AppError> {
        let ids: Vec<Uuid> = {
            let state = self.state.lock().unwrap();
            state
                .templates
                .values()
                .filter(|t| {
                    t.organization_id == organization_id
                        || t.organization_id == UNIVERSAL_ORGANIZATION_ID
                })
                .map(|t| t.id)
                .collect()
        };

        let mut templates = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(template) = self.get_visible(organization_id, id).await? {
                templates.push(template);
            }
        }
        templates.sort_by_key(|t| t.template.created_at);
        Ok(templates)
    }

    async fn count_leads(&self, template_id: Uuid) -> Result<i64, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .leads
            .values()
            .filter(|l| l.template_id == template_id)
            .count() as i64)
    }

    async fn delete_cascade(&self, template_id: Uuid) -> Result<(), AppError> {
        let mut state = self.state.lock().unwrap();
        let field_ids: Vec<Uuid> = state
            .fields
            .values()
            .filter(|f| f.template_id == template_id)
            .map(|f| f.id)
            .collect();

        state
            .values
            .retain(|_, v| !field_ids.contains(&v.field_id));
        state.fields.retain(|_, f| f.template_id != template_id);
        state.templates.remove(&template_id);
        Ok(())
    }
}

fn new_lead_value(lead_id: Uuid, field_id: Uuid, value: &str) -> LeadValue {
    let now = Utc::now();
    LeadValue {
        id: Uuid::new_v4(),
        lead_id,
        field_id,
        value: value.to_string(),
        created_at: now,
        updated_at: now,
    }
}

fn reject_failing_value(value: &str) -> Result<(), AppError> {
    if value == FAILING_VALUE {
        return Err(AppError::Internal(
            "synthetic value write failure".to_string(),
        ));
    }
    Ok(())
}

#[async_trait]
impl LeadStore for InMemoryStore {
    async fn insert_lead(&self, lead: &NewLead) -> Result<Lead, AppError> {
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();
        let row = Lead {
            id: Uuid::new_v4(),
            organization_id: lead.organization_id,
            template_id: lead.template_id,
            status: lead.status,
            created_by: lead.created_by,
            created_at: now,
            updated_at: now,
        };
        state.leads.insert(row.id, row.clone());
        Ok(row)
    }

    async fn insert_lead_with_values(
        &self,
        lead: &NewLead,
        values: &[(Uuid, String)],
    ) -> Result<Lead, AppError> {
        let mut state = self.state.lock().unwrap();

        // All-or-nothing: validate every value before writing anything.
        for (_, value) in values {
            reject_failing_value(value)?;
        }

        let now = Utc::now();
        let row = Lead {
            id: Uuid::new_v4(),
            organization_id: lead.organization_id,
            template_id: lead.template_id,
            status: lead.status,
            created_by: lead.created_by,
            created_at: now,
            updated_at: now,
        };
        state.leads.insert(row.id, row.clone());
        for (field_id, value) in values {
            let value_row = new_lead_value(row.id, *field_id, value);
            state.values.insert(value_row.id, value_row);
        }
        Ok(row)
    }

    async fn insert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError> {
        reject_failing_value(value)?;
        let mut state = self.state.lock().unwrap();

        if state
            .values
            .values()
            .any(|v| v.lead_id == lead_id && v.field_id == field_id)
        {
            return Err(AppError::Internal(
                "duplicate value for (lead, field)".to_string(),
            ));
        }

        let row = new_lead_value(lead_id, field_id, value);
        state.values.insert(row.id, row.clone());
        Ok(row)
    }

    async fn upsert_value(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<LeadValue, AppError> {
        reject_failing_value(value)?;
        let mut state = self.state.lock().unwrap();
        let now = Utc::now();

        let existing_id = state
            .values
            .values()
            .find(|v| v.lead_id == lead_id && v.field_id == field_id)
            .map(|v| v.id);

        let row = match existing_id {
            Some(id) => {
                let row = state.values.get_mut(&id).unwrap();
                row.value = value.to_string();
                row.updated_at = now;
                row.clone()
            }
            None => {
                let row = new_lead_value(lead_id, field_id, value);
                state.values.insert(row.id, row.clone());
                row
            }
        };

        if let Some(lead) = state.leads.get_mut(&lead_id) {
            lead.updated_at = now;
        }
        Ok(row)
    }

    async fn insert_value_if_absent(
        &self,
        lead_id: Uuid,
        field_id: Uuid,
        value: &str,
    ) -> Result<bool, AppError> {
        reject_failing_value(value)?;
        let mut state = self.state.lock().unwrap();

        if state
            .values
            .values()
            .any(|v| v.lead_id == lead_id && v.field_id == field_id)
        {
            return Ok(false);
        }

        let row = new_lead_value(lead_id, field_id, value);
        state.values.insert(row.id, row);
        Ok(true)
    }

    async fn get(&self, organization_id: Uuid, lead_id: Uuid) -> Result<Option<Lead>, AppError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .leads
            .get(&lead_id)
            .filter(|l| l.organization_id == organization_id)
            .cloned())
    }

    async fn list(&self, organization_id: Uuid) -> Result<Vec<Lead>, AppError> {
        let state = self.state.lock().unwrap();
        let mut leads: Vec<Lead> = state
            .leads
            .values()
            .filter(|l| l.organization_id == organization_id)
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.created_at);
        Ok(leads)
    }

    async fn values_for(&self, lead_id: Uuid) -> Result<Vec<LeadValue>, AppError> {
        let state = self.state.lock().unwrap();
        let mut values: Vec<LeadValue> = state
            .values
            .values()
            .filter(|v| v.lead_id == lead_id)
            .cloned()
            .collect();
        values.sort_by_key(|v| {
            state
                .fields
                .get(&v.field_id)
                .map(|f| f.sort_order)
                .unwrap_or(i32::MAX)
        });
        Ok(values)
    }

    async fn update_status(
        &self,
        organization_id: Uuid,
        lead_id: Uuid,
        status: LeadStatus,
    ) -> Result<Option<Lead>, AppError> {
        let mut state = self.state.lock().unwrap();
        match state.leads.get_mut(&lead_id) {
            Some(lead) if lead.organization_id == organization_id => {
                lead.status = status;
                lead.updated_at = Utc::now();
                Ok(Some(lead.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete(&self, organization_id: Uuid, lead_id: Uuid) -> Result<bool, AppError> {
        let mut state = self.state.lock().unwrap();
        let matches = state
            .leads
            .get(&lead_id)
            .map(|l| l.organization_id == organization_id)
            .unwrap_or(false);
        if matches {
            state.values.retain(|_, v| v.lead_id != lead_id);
            state.leads.remove(&lead_id);
        }
        Ok(matches)
    }
}
