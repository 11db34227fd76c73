use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership role, ordered by authority (owner highest).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "membership_role", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MembershipRole::Owner => "owner",
            MembershipRole::Admin => "admin",
            MembershipRole::Member => "member",
            MembershipRole::Viewer => "viewer",
        }
    }

    /// Parse a role string. Unknown strings return `None`; the authority
    /// module treats unknown roles as least authority.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "owner" => Some(MembershipRole::Owner),
            "admin" => Some(MembershipRole::Admin),
            "member" => Some(MembershipRole::Member),
            "viewer" => Some(MembershipRole::Viewer),
            _ => None,
        }
    }
}

impl std::fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Membership status. Removal and revocation are terminal and modeled as row
/// deletion, so only the two live states exist here.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "membership_status", rename_all = "lowercase")
)]
#[serde(rename_all = "lowercase")]
pub enum MembershipStatus {
    Invited,
    Accepted,
}

/// Membership entity. Either bound to a principal (`status = accepted`) or to
/// an invited email carrying a single-use token (`status = invited`), never
/// both.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Membership {
    pub id: Uuid,
    pub organization_id: Uuid,
    pub user_id: Option<Uuid>,
    pub role: MembershipRole,
    pub status: MembershipStatus,
    pub invited_email: Option<String>,
    pub invited_token: Option<String>,
    pub invited_expires_at: Option<DateTime<Utc>>,
    pub invited_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Membership {
    pub fn is_accepted(&self) -> bool {
        self.status == MembershipStatus::Accepted
    }

    pub fn is_invited(&self) -> bool {
        self.status == MembershipStatus::Invited
    }

    /// Whether a pending invitation is past its expiry at `now`.
    pub fn invite_expired_at(&self, now: DateTime<Utc>) -> bool {
        matches!(self.invited_expires_at, Some(expires_at) if expires_at <= now)
    }
}

/// Data for a new invitation row.
#[derive(Debug, Clone)]
pub struct NewInvite {
    pub organization_id: Uuid,
    pub email: String,
    pub role: MembershipRole,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub invited_by: Uuid,
}
