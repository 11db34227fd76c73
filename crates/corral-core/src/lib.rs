//! Corral Core Library
//!
//! This crate provides the domain models, error types, configuration, and the
//! pure decision logic (role authority, display-name derivation, field-key
//! derivation, permission caching) shared across all Corral components.

pub mod authority;
pub mod config;
pub mod constants;
pub mod display_name;
pub mod error;
pub mod models;
pub mod permission_cache;
pub mod validation;

// Re-export commonly used types
pub use authority::{assignable_roles, can_act_on, capabilities_for, Capabilities, Capability};
pub use config::Config;
pub use display_name::{avatar_initial, display_name, LabeledValue};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use permission_cache::{Clock, PermissionCache, SystemClock};
