//! Data models for the application
//!
//! This module contains all data structures used throughout the application,
//! organized by domain. Each sub-module represents a specific feature area.

mod lead;
mod membership;
mod organization;
mod principal;
mod template;

// Re-export all models for convenient imports
pub use lead::*;
pub use membership::*;
pub use organization::*;
pub use principal::*;
pub use template::*;
