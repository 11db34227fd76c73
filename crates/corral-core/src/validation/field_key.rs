//! Field key derivation and validation.
//!
//! Keys are derived deterministically from human labels: lowercase, spaces to
//! underscores, every other non-alphanumeric character stripped, leading and
//! trailing underscores trimmed. Two different labels can collapse to the
//! same key, so callers re-check uniqueness after derivation (bulk import
//! deduplicates with `_1`, `_2`, ... suffixes).

use anyhow::{Context, Result};
use regex::Regex;
use std::collections::HashSet;

/// Maximum length for field keys (64 characters)
pub const MAX_FIELD_KEY_LENGTH: usize = 64;

/// Fallback key for labels that contain no usable characters at all.
const EMPTY_LABEL_KEY: &str = "field";

/// Derive a field key from a human label.
pub fn derive_field_key(label: &str) -> String {
    let mut key = String::with_capacity(label.len());

    for c in label.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if c == ' ' || c == '_' {
            // Collapse runs so "First  Name" and "First Name" agree.
            if !key.ends_with('_') {
                key.push('_');
            }
        }
    }

    let key = key.trim_matches('_');
    if key.is_empty() {
        EMPTY_LABEL_KEY.to_string()
    } else {
        key.chars().take(MAX_FIELD_KEY_LENGTH).collect()
    }
}

/// Derive keys for a batch of labels, suffixing collisions with `_1`, `_2`, ...
/// in encounter order. The first occurrence keeps the bare key.
pub fn unique_field_keys<'a, I>(labels: I) -> Vec<String>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen: HashSet<String> = HashSet::new();
    let mut keys = Vec::new();

    for label in labels {
        let base = derive_field_key(label);
        let mut candidate = base.clone();
        let mut suffix = 0;
        while seen.contains(&candidate) {
            suffix += 1;
            candidate = format!("{}_{}", base, suffix);
        }
        seen.insert(candidate.clone());
        keys.push(candidate);
    }

    keys
}

/// Validate a field key supplied directly by a caller (import mappings can
/// carry pre-derived keys).
pub fn validate_field_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(anyhow::anyhow!("Field key cannot be empty"));
    }

    if key.len() > MAX_FIELD_KEY_LENGTH {
        return Err(anyhow::anyhow!(
            "Field key '{}' exceeds maximum length of {} characters",
            key,
            MAX_FIELD_KEY_LENGTH
        ));
    }

    let pattern = Regex::new(r"^[a-z0-9][a-z0-9_]*$")
        .context("Failed to compile field key validation regex")?;

    if !pattern.is_match(key) {
        return Err(anyhow::anyhow!(
            "Field key '{}' contains invalid characters. Allowed: lowercase letters (a-z), digits (0-9), underscore (_); must not start with an underscore",
            key
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_basic() {
        assert_eq!(derive_field_key("First Name"), "first_name");
        assert_eq!(derive_field_key("Email"), "email");
        assert_eq!(derive_field_key("Company (Legal)"), "company_legal");
    }

    #[test]
    fn test_derive_strips_and_trims() {
        assert_eq!(derive_field_key("  Phone #2  "), "phone_2");
        assert_eq!(derive_field_key("___weird___"), "weird");
        assert_eq!(derive_field_key("First  Name"), "first_name");
    }

    #[test]
    fn test_derive_empty_label_falls_back() {
        assert_eq!(derive_field_key("!!!"), "field");
        assert_eq!(derive_field_key(""), "field");
    }

    #[test]
    fn test_collisions_are_suffixed_in_order() {
        let keys = unique_field_keys(["Name", "name", "NAME!", "Other"]);
        assert_eq!(keys, vec!["name", "name_1", "name_2", "other"]);
    }

    #[test]
    fn test_suffix_collision_with_existing_key() {
        // "name_1" already taken by a derived key; the colliding "name"
        // must skip past it.
        let keys = unique_field_keys(["Name 1", "Name", "Name"]);
        assert_eq!(keys, vec!["name_1", "name", "name_2"]);
    }

    #[test]
    fn test_validate_field_key() {
        assert!(validate_field_key("first_name").is_ok());
        assert!(validate_field_key("a1").is_ok());
        assert!(validate_field_key("").is_err());
        assert!(validate_field_key("_leading").is_err());
        assert!(validate_field_key("UPPER").is_err());
        assert!(validate_field_key("has space").is_err());
        assert!(validate_field_key(&"x".repeat(65)).is_err());
    }
}
