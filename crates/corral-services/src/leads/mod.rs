//! Lead records: creation, values, status, display names.

mod service;

pub use service::{
    CreateLeadRequest, CreatedLead, LeadDetail, LeadService, LeadSummary, ReconcileOutcome,
};
