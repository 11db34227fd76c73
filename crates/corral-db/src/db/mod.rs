//! Database repositories for the data access layer
//!
//! One repository per aggregate: organizations (with their creator
//! membership), memberships, templates (with fields), and leads (with
//! values). Repositories own the SQL; invariant guards and permission checks
//! live in the service layer, except the checks that must be atomic with the
//! write itself (invite claim, last-owner counts).

pub mod lead;
pub mod membership;
pub mod organization;
pub mod template;
pub mod transaction;

pub use lead::LeadRepository;
pub use membership::MembershipRepository;
pub use organization::OrganizationRepository;
pub use template::TemplateRepository;
