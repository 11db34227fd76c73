//! Corral Database Layer
//!
//! This crate provides the sqlx/Postgres repositories for organizations,
//! memberships, templates and leads, plus the store trait abstractions the
//! service layer is written against.

pub mod db;
pub mod store_traits;

// Re-exports: repositories
pub use db::{LeadRepository, MembershipRepository, OrganizationRepository, TemplateRepository};

// Re-exports: transaction utilities
pub use db::transaction::TransactionGuard;

// Re-exports: store traits and outcomes
pub use store_traits::{
    LeadStore, MembershipStore, OrganizationStore, RemovalOutcome, RoleChangeOutcome,
    TemplateStore,
};
