//! Dynamic schema: templates and their fields.

mod service;

pub use service::{CreateTemplateRequest, FieldSpec, SchemaService};
