//! Bulk import: tabular rows projected into a new template and its leads.

mod service;

pub use service::{ColumnMapping, ImportReport, ImportRequest, ImportRowError, ImportService};
