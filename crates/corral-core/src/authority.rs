//! Role authority: pure permission-derivation logic.
//!
//! The hierarchy is strictly ordered by authority, lower number = more
//! authority: owner=1, admin=2, member=3, viewer=4. Unknown role strings map
//! to 5, the least authority, so a bad role can never widen access.
//!
//! The organization creator is an unconditional superuser over everyone else,
//! including holders of the nominal `owner` role - but never over their own
//! membership: no principal may change or remove itself.

use serde::{Deserialize, Serialize};

use crate::models::MembershipRole;

/// Authority level of roles supplied as raw strings (e.g. from an external
/// caller). Unknown strings get the least-authority default.
pub fn authority_level(role: &str) -> u8 {
    match MembershipRole::parse(role) {
        Some(role) => role.level(),
        None => 5,
    }
}

impl MembershipRole {
    /// Authority level: 1 = most authority.
    pub fn level(&self) -> u8 {
        match self {
            MembershipRole::Owner => 1,
            MembershipRole::Admin => 2,
            MembershipRole::Member => 3,
            MembershipRole::Viewer => 4,
        }
    }
}

/// One permission a caller may be required to hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Capability {
    ViewLeads,
    CreateLeads,
    EditLeads,
    DeleteLeads,
    ManageTemplates,
    InviteMembers,
    ManageMembers,
    ManageOrganization,
}

impl Capability {
    /// User-facing denial reason for a missing capability.
    pub fn denied_reason(&self) -> &'static str {
        match self {
            Capability::ViewLeads => "you do not have permission to view leads",
            Capability::CreateLeads => "you do not have permission to create leads",
            Capability::EditLeads => "you do not have permission to edit leads",
            Capability::DeleteLeads => "you do not have permission to delete leads",
            Capability::ManageTemplates => "you do not have permission to manage templates",
            Capability::InviteMembers => "you do not have permission to invite members",
            Capability::ManageMembers => "you do not have permission to manage members",
            Capability::ManageOrganization => {
                "you do not have permission to manage this organization"
            }
        }
    }
}

/// Per-role capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    pub view_leads: bool,
    pub create_leads: bool,
    pub edit_leads: bool,
    pub delete_leads: bool,
    pub manage_templates: bool,
    pub invite_members: bool,
    pub manage_members: bool,
    pub manage_organization: bool,
}

impl Capabilities {
    pub const fn all() -> Self {
        Self {
            view_leads: true,
            create_leads: true,
            edit_leads: true,
            delete_leads: true,
            manage_templates: true,
            invite_members: true,
            manage_members: true,
            manage_organization: true,
        }
    }

    pub const fn none() -> Self {
        Self {
            view_leads: false,
            create_leads: false,
            edit_leads: false,
            delete_leads: false,
            manage_templates: false,
            invite_members: false,
            manage_members: false,
            manage_organization: false,
        }
    }

    pub fn allows(&self, capability: Capability) -> bool {
        match capability {
            Capability::ViewLeads => self.view_leads,
            Capability::CreateLeads => self.create_leads,
            Capability::EditLeads => self.edit_leads,
            Capability::DeleteLeads => self.delete_leads,
            Capability::ManageTemplates => self.manage_templates,
            Capability::InviteMembers => self.invite_members,
            Capability::ManageMembers => self.manage_members,
            Capability::ManageOrganization => self.manage_organization,
        }
    }
}

/// Derive the capability set for a role. The organization creator gets the
/// maximal set unconditionally, whatever their membership role says.
pub fn capabilities_for(role: MembershipRole, is_org_creator: bool) -> Capabilities {
    if is_org_creator {
        return Capabilities::all();
    }

    match role {
        MembershipRole::Owner => Capabilities::all(),
        MembershipRole::Admin => Capabilities {
            manage_organization: false,
            ..Capabilities::all()
        },
        MembershipRole::Member => Capabilities {
            view_leads: true,
            create_leads: true,
            edit_leads: true,
            ..Capabilities::none()
        },
        MembershipRole::Viewer => Capabilities {
            view_leads: true,
            ..Capabilities::none()
        },
    }
}

/// Whether the acting principal may change or remove the target membership.
///
/// Self-targeting is always refused, for every role and for the creator: this
/// is a hard rule, not a hierarchy comparison. Otherwise the creator may act
/// on anyone, and a non-creator needs owner/admin authority plus a target of
/// strictly less authority. Equal-or-higher-authority targets are protected.
pub fn can_act_on(
    acting_role: MembershipRole,
    acting_is_creator: bool,
    acting_is_self: bool,
    target_role: MembershipRole,
) -> bool {
    if acting_is_self {
        return false;
    }
    if acting_is_creator {
        return true;
    }
    acting_role.level() <= 2 && target_role.level() > acting_role.level()
}

/// Roles the acting principal may assign to others. The creator and the
/// `owner` role may assign any role; everyone else may only assign roles of
/// strictly less authority than their own.
pub fn assignable_roles(acting_role: MembershipRole, acting_is_creator: bool) -> Vec<MembershipRole> {
    const ALL: [MembershipRole; 4] = [
        MembershipRole::Owner,
        MembershipRole::Admin,
        MembershipRole::Member,
        MembershipRole::Viewer,
    ];

    if acting_is_creator || acting_role == MembershipRole::Owner {
        return ALL.to_vec();
    }

    ALL.iter()
        .copied()
        .filter(|candidate| candidate.level() > acting_role.level())
        .collect()
}
