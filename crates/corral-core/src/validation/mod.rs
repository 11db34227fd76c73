//! Validation modules

pub mod field_key;

pub use field_key::{derive_field_key, unique_field_keys, validate_field_key, MAX_FIELD_KEY_LENGTH};
