//! Display-name derivation for leads.
//!
//! Leads have no dedicated name column; the label shown in listings, search
//! results and avatars is derived from whatever values the lead carries. The
//! precedence below is depended on everywhere leads are rendered and must not
//! be reordered.

use url::Url;
use uuid::Uuid;

/// Field labels are scanned for these substrings, in order, before any other
/// fallback applies.
const PREFERRED_LABEL_SUBSTRINGS: [&str; 6] =
    ["name", "full_name", "first_name", "company", "title", "email"];

/// Values longer than this are not acceptable as a bare display name.
const MAX_SCALAR_LEN: usize = 50;

/// Unparseable URL-like values are truncated to this many chars.
const TRUNCATED_URL_LEN: usize = 30;

/// One value paired with the label of the field it belongs to, in the
/// template's field order.
#[derive(Debug, Clone)]
pub struct LabeledValue {
    pub label: String,
    pub value: String,
}

impl LabeledValue {
    pub fn new(label: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: value.into(),
        }
    }
}

/// Derive the human label for a lead from its values.
///
/// Precedence: preferred field labels, then the first plain scalar value,
/// then the hostname of a URL-like value, then the lead id stub.
pub fn display_name(lead_id: Uuid, values: &[LabeledValue]) -> String {
    if values.is_empty() {
        return id_stub(lead_id);
    }

    for substring in PREFERRED_LABEL_SUBSTRINGS {
        if let Some(found) = values.iter().find(|v| {
            v.label.to_lowercase().contains(substring) && !v.value.trim().is_empty()
        }) {
            return found.value.trim().to_string();
        }
    }

    if let Some(plain) = values.iter().map(|v| v.value.trim()).find(|v| {
        !v.is_empty()
            && !is_url_like(v)
            && v.chars().count() <= MAX_SCALAR_LEN
            && !is_path_like(v)
            && !is_purely_numeric(v)
    }) {
        return plain.to_string();
    }

    if let Some(url_like) = values
        .iter()
        .map(|v| v.value.trim())
        .find(|v| is_url_like(v))
    {
        return name_from_url(url_like);
    }

    id_stub(lead_id)
}

/// First character of the derived display name, uppercased, for avatar
/// rendering. Empty input maps to "?".
pub fn avatar_initial(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_uppercase().to_string())
        .unwrap_or_else(|| "?".to_string())
}

fn id_stub(lead_id: Uuid) -> String {
    let id = lead_id.to_string();
    format!("Lead #{}", &id[..8])
}

fn is_url_like(value: &str) -> bool {
    value.starts_with("http") || value.contains("://")
}

fn is_path_like(value: &str) -> bool {
    value.contains('/') && value.contains('.')
}

fn is_purely_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}

fn name_from_url(value: &str) -> String {
    match Url::parse(value)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
    {
        Some(host) => {
            let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
            host.split('.')
                .next()
                .filter(|segment| !segment.is_empty())
                .map(str::to_string)
                .unwrap_or(host)
        }
        None => {
            let truncated: String = value.chars().take(TRUNCATED_URL_LEN).collect();
            format!("{}...", truncated)
        }
    }
}
