//! Corral Services Library
//!
//! This crate provides the application services built on top of the core
//! models and the store traits: access control, membership lifecycle, schema
//! management, lead records and bulk import. Services depend on the store
//! traits only, never on sqlx directly, so every behavior is testable against
//! in-memory store implementations.

pub mod access;
pub mod import;
pub mod leads;
pub mod membership;
pub mod schema;

pub use access::{AccessControl, Actor};
pub use import::{ColumnMapping, ImportReport, ImportRequest, ImportRowError, ImportService};
pub use leads::{CreateLeadRequest, CreatedLead, LeadDetail, LeadService, LeadSummary, ReconcileOutcome};
pub use membership::{InviteMemberRequest, IssuedInvite, MembershipService};
pub use schema::{CreateTemplateRequest, FieldSpec, SchemaService};
