//! Membership lifecycle: organization creation, invitations, claims, role
//! changes, removals.

mod service;
mod token;

pub use service::{InviteMemberRequest, IssuedInvite, MembershipService};
pub use token::generate_invite_token;
